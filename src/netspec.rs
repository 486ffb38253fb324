use std::collections::HashSet;
use std::fmt;

use log::debug;
use serde::Serialize;

use crate::classify::{
    is_coordinate, is_driver, is_mac, is_qinq, is_wifi, QINQ_KEYWORD, WIFI_KEYWORD,
};
use crate::error::{Result, SpecError};

pub const DEFAULT_BRIDGE: &str = "mega_bridge";
pub const DEFAULT_DRIVER: &str = "e1000";

/// Physical position of a wifi station, in meters relative to the origin.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WifiCoordinates {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WiredInterface {
    pub alias: String,
    /// Resolved from `alias` by the owning namespace, 0 until then.
    pub vlan: i32,
    pub bridge: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    pub driver: String,
    pub qinq: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WirelessInterface {
    pub coordinates: WifiCoordinates,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Attachment {
    Wired(WiredInterface),
    Wireless(WirelessInterface),
}

/// One network attachment of a VM.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    #[serde(flatten)]
    pub attachment: Attachment,
    /// Spec text this interface was created from. Reparsed when the owning
    /// VM is cloned.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw: String,
}

impl InterfaceConfig {
    pub fn is_wifi(&self) -> bool {
        matches!(self.attachment, Attachment::Wireless(_))
    }

    pub fn alias(&self) -> Option<&str> {
        match &self.attachment {
            Attachment::Wired(wired) => Some(wired.alias.as_str()),
            Attachment::Wireless(_) => None,
        }
    }

    /// Wifi stations are always attached to the default bridge.
    pub fn bridge(&self) -> &str {
        match &self.attachment {
            Attachment::Wired(wired) => wired.bridge.as_str(),
            Attachment::Wireless(_) => DEFAULT_BRIDGE,
        }
    }

    pub fn vlan(&self) -> Option<i32> {
        match &self.attachment {
            Attachment::Wired(wired) => Some(wired.vlan),
            Attachment::Wireless(_) => None,
        }
    }

    pub fn qinq(&self) -> bool {
        match &self.attachment {
            Attachment::Wired(wired) => wired.qinq,
            Attachment::Wireless(_) => false,
        }
    }
}

impl fmt::Display for InterfaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();

        match &self.attachment {
            Attachment::Wired(wired) => {
                if !wired.bridge.is_empty() && wired.bridge != DEFAULT_BRIDGE {
                    parts.push(wired.bridge.clone());
                }
                parts.push(wired.alias.clone());
                if let Some(mac) = &wired.mac {
                    parts.push(mac.clone());
                }
                if !wired.driver.is_empty() && wired.driver != DEFAULT_DRIVER {
                    parts.push(wired.driver.clone());
                }
                if wired.qinq {
                    parts.push(QINQ_KEYWORD.to_string());
                }
            }
            Attachment::Wireless(wireless) => {
                let c = wireless.coordinates;
                parts.push(WIFI_KEYWORD.to_string());
                parts.extend([c.x, c.y, c.z].iter().map(i32::to_string));
            }
        }

        write!(f, "{}", parts.join(","))
    }
}

#[derive(Clone, Copy)]
enum Token {
    Mac,
    Driver,
    QinQ,
    Wifi,
    Coordinate,
}

impl Token {
    fn holds(self, token: &str, drivers: &HashSet<String>) -> bool {
        match self {
            Token::Mac => is_mac(token),
            Token::Driver => is_driver(token, drivers),
            Token::QinQ => is_qinq(token),
            Token::Wifi => is_wifi(token),
            Token::Coordinate => is_coordinate(token),
        }
    }
}

#[derive(Clone, Copy)]
enum Field {
    Bridge,
    Alias,
    Mac,
    Driver,
    QinQ,
}

enum Layout {
    Wired(&'static [Field]),
    Wireless,
}

/// A spec shape: if every guard holds, tokens are read according to `layout`.
struct Form {
    guards: &'static [(usize, Token)],
    layout: Layout,
}

const fn wired(guards: &'static [(usize, Token)], fields: &'static [Field]) -> Form {
    Form {
        guards,
        layout: Layout::Wired(fields),
    }
}

const ONE_TOKEN: &[Form] = &[wired(&[], &[Field::Alias])];

const TWO_TOKENS: &[Form] = &[
    wired(&[(1, Token::QinQ)], &[Field::Alias, Field::QinQ]),
    wired(&[(1, Token::Mac)], &[Field::Alias, Field::Mac]),
    wired(&[(1, Token::Driver)], &[Field::Alias, Field::Driver]),
    wired(&[], &[Field::Bridge, Field::Alias]),
];

const THREE_TOKENS: &[Form] = &[
    wired(
        &[(2, Token::QinQ), (1, Token::Mac)],
        &[Field::Alias, Field::Mac, Field::QinQ],
    ),
    wired(
        &[(2, Token::QinQ), (1, Token::Driver)],
        &[Field::Alias, Field::Driver, Field::QinQ],
    ),
    wired(
        &[(2, Token::QinQ)],
        &[Field::Bridge, Field::Alias, Field::QinQ],
    ),
    wired(
        &[(2, Token::Mac)],
        &[Field::Bridge, Field::Alias, Field::Mac],
    ),
    wired(
        &[(1, Token::Mac), (2, Token::Driver)],
        &[Field::Alias, Field::Mac, Field::Driver],
    ),
    wired(
        &[(2, Token::Driver)],
        &[Field::Bridge, Field::Alias, Field::Driver],
    ),
];

// The first form does not check the driver token.
const FOUR_TOKENS: &[Form] = &[
    wired(
        &[(3, Token::QinQ), (1, Token::Mac)],
        &[Field::Alias, Field::Mac, Field::Driver, Field::QinQ],
    ),
    wired(
        &[(3, Token::QinQ), (2, Token::Mac)],
        &[Field::Bridge, Field::Alias, Field::Mac, Field::QinQ],
    ),
    wired(
        &[(3, Token::QinQ), (2, Token::Driver)],
        &[Field::Bridge, Field::Alias, Field::Driver, Field::QinQ],
    ),
    wired(
        &[(3, Token::Driver), (2, Token::Mac)],
        &[Field::Bridge, Field::Alias, Field::Mac, Field::Driver],
    ),
    Form {
        guards: &[
            (0, Token::Wifi),
            (1, Token::Coordinate),
            (2, Token::Coordinate),
            (3, Token::Coordinate),
        ],
        layout: Layout::Wireless,
    },
];

const FIVE_TOKENS: &[Form] = &[wired(
    &[(2, Token::Mac), (3, Token::Driver), (4, Token::QinQ)],
    &[
        Field::Bridge,
        Field::Alias,
        Field::Mac,
        Field::Driver,
        Field::QinQ,
    ],
)];

fn forms(count: usize) -> &'static [Form] {
    match count {
        1 => ONE_TOKEN,
        2 => TWO_TOKENS,
        3 => THREE_TOKENS,
        4 => FOUR_TOKENS,
        5 => FIVE_TOKENS,
        _ => &[],
    }
}

/// Parse an interface spec such as `my_bridge,foo,de:ad:be:ef:ca:fe`.
///
/// The grammar is positional with no field markers, so the meaning of each
/// token is decided by the token count and the first matching form for that
/// count. `drivers` holds the NIC models the hypervisor supports; it is what
/// tells `alias,driver` apart from `bridge,alias`.
pub fn parse_net_spec(spec: &str, drivers: &HashSet<String>) -> Result<InterfaceConfig> {
    // example: my_bridge,100,00:00:00:00:00:00
    if spec.is_empty() {
        return Err(SpecError::MalformedNetSpec(spec.to_string()));
    }

    let tokens: Vec<&str> = spec.split(',').collect();

    let form = forms(tokens.len())
        .iter()
        .find(|form| {
            form.guards
                .iter()
                .all(|&(pos, token)| token.holds(tokens[pos], drivers))
        })
        .ok_or_else(|| SpecError::MalformedNetSpec(spec.to_string()))?;

    let attachment = match form.layout {
        Layout::Wired(fields) => Attachment::Wired(read_wired(spec, &tokens, fields)?),
        Layout::Wireless => Attachment::Wireless(read_wireless(&tokens)?),
    };

    debug!("Parsed netspec '{spec}': {attachment:?}");

    Ok(InterfaceConfig {
        attachment,
        raw: String::new(),
    })
}

fn read_wired(spec: &str, tokens: &[&str], fields: &[Field]) -> Result<WiredInterface> {
    let mut iface = WiredInterface {
        alias: String::new(),
        vlan: 0,
        bridge: String::new(),
        mac: None,
        driver: String::new(),
        qinq: false,
    };

    for (field, token) in fields.iter().zip(tokens) {
        match field {
            Field::Bridge => iface.bridge = token.to_string(),
            Field::Alias => iface.alias = token.to_string(),
            Field::Mac => iface.mac = Some(token.to_lowercase()),
            Field::Driver => iface.driver = token.to_string(),
            Field::QinQ => iface.qinq = true,
        }
    }

    // only wifi stations go without an alias
    if iface.alias.is_empty() {
        return Err(SpecError::MalformedNetSpec(spec.to_string()));
    }

    if iface.bridge.is_empty() {
        iface.bridge = DEFAULT_BRIDGE.to_string();
    }
    if iface.driver.is_empty() {
        iface.driver = DEFAULT_DRIVER.to_string();
    }

    Ok(iface)
}

fn read_wireless(tokens: &[&str]) -> Result<WirelessInterface> {
    let coordinate = |axis: char, token: &str| {
        token
            .parse::<i32>()
            .map_err(|_| SpecError::CoordinateParse {
                axis,
                token: token.to_string(),
            })
    };

    Ok(WirelessInterface {
        coordinates: WifiCoordinates {
            x: coordinate('x', tokens[1])?,
            y: coordinate('y', tokens[2])?,
            z: coordinate('z', tokens[3])?,
        },
    })
}
