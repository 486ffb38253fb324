use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::Serialize;

use crate::classify::{
    is_bond_mode, is_lacp_mode, is_no_fallback, is_qinq, NO_FALLBACK_KEYWORD, QINQ_KEYWORD,
};
use crate::error::{Result, SpecError};

/// Prefix of bond names generated at launch time. Such names are never
/// written back into a spec.
pub const BOND_NAME_PREFIX: &str = "mega_bond";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BondMode {
    ActiveBackup,
    BalanceSlb,
    BalanceTcp,
}

impl BondMode {
    const ALL: [BondMode; 3] = [
        BondMode::ActiveBackup,
        BondMode::BalanceSlb,
        BondMode::BalanceTcp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BondMode::ActiveBackup => "active-backup",
            BondMode::BalanceSlb => "balance-slb",
            BondMode::BalanceTcp => "balance-tcp",
        }
    }
}

impl FromStr for BondMode {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self> {
        BondMode::ALL
            .into_iter()
            .find(|mode| s.eq_ignore_ascii_case(mode.as_str()))
            .ok_or_else(|| SpecError::MalformedBondSpec(format!("unknown bond mode {s}")))
    }
}

impl fmt::Display for BondMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LacpMode {
    #[default]
    Active,
    Passive,
    Off,
}

impl LacpMode {
    const ALL: [LacpMode; 3] = [LacpMode::Active, LacpMode::Passive, LacpMode::Off];

    pub fn as_str(&self) -> &'static str {
        match self {
            LacpMode::Active => "active",
            LacpMode::Passive => "passive",
            LacpMode::Off => "off",
        }
    }
}

impl FromStr for LacpMode {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self> {
        LacpMode::ALL
            .into_iter()
            .find(|mode| s.eq_ignore_ascii_case(mode.as_str()))
            .ok_or_else(|| SpecError::MalformedBondSpec(format!("unknown LACP mode {s}")))
    }
}

impl fmt::Display for LacpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bond over interfaces of the same VM.
///
/// `bridge` and `vlan` are derived from the bonded interfaces by
/// [`crate::validate::resolve_bond`] and cannot be set from a spec.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BondConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub mode: BondMode,
    pub lacp: LacpMode,
    pub fallback: bool,
    pub qinq: bool,
    /// Indexes into the owning VM's interface list.
    pub interfaces: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan: Option<i32>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw: String,
}

impl BondConfig {
    pub fn contains(&self, index: usize) -> bool {
        self.interfaces.contains(&index)
    }
}

impl fmt::Display for BondConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.interfaces.iter().map(usize::to_string).collect();

        parts.push(self.mode.to_string());

        if !self.fallback {
            parts.push(self.lacp.to_string());
            parts.push(NO_FALLBACK_KEYWORD.to_string());
        } else if self.lacp != LacpMode::Active {
            parts.push(self.lacp.to_string());
        }

        if self.qinq {
            parts.push(QINQ_KEYWORD.to_string());
        }

        if let Some(name) = &self.name {
            if !name.starts_with(BOND_NAME_PREFIX) {
                parts.push(name.clone());
            }
        }

        write!(f, "{}", parts.join(","))
    }
}

#[derive(Clone, Copy)]
enum Token {
    Lacp,
    NoFallback,
    QinQ,
}

impl Token {
    fn holds(self, token: &str) -> bool {
        match self {
            Token::Lacp => is_lacp_mode(token),
            Token::NoFallback => is_no_fallback(token),
            Token::QinQ => is_qinq(token),
        }
    }
}

#[derive(Clone, Copy)]
enum Field {
    Lacp,
    NoFallback,
    QinQ,
    Name,
}

/// Trailing fields start at this absolute token position.
const TRAILING_START: usize = 3;

struct Form {
    guards: &'static [(usize, Token)],
    fields: &'static [Field],
}

const THREE_TOKENS: &[Form] = &[Form {
    guards: &[],
    fields: &[],
}];

const FOUR_TOKENS: &[Form] = &[
    Form {
        guards: &[(3, Token::Lacp)],
        fields: &[Field::Lacp],
    },
    Form {
        guards: &[(3, Token::QinQ)],
        fields: &[Field::QinQ],
    },
    Form {
        guards: &[],
        fields: &[Field::Name],
    },
];

const FIVE_TOKENS: &[Form] = &[
    Form {
        guards: &[(3, Token::QinQ)],
        fields: &[Field::QinQ, Field::Name],
    },
    Form {
        guards: &[(3, Token::Lacp), (4, Token::NoFallback)],
        fields: &[Field::Lacp, Field::NoFallback],
    },
    Form {
        guards: &[(3, Token::Lacp), (4, Token::QinQ)],
        fields: &[Field::Lacp, Field::QinQ],
    },
    Form {
        guards: &[(3, Token::Lacp)],
        fields: &[Field::Lacp, Field::Name],
    },
];

const SIX_TOKENS: &[Form] = &[
    Form {
        guards: &[(3, Token::Lacp), (4, Token::NoFallback), (5, Token::QinQ)],
        fields: &[Field::Lacp, Field::NoFallback, Field::QinQ],
    },
    Form {
        guards: &[(3, Token::Lacp), (4, Token::NoFallback)],
        fields: &[Field::Lacp, Field::NoFallback, Field::Name],
    },
    Form {
        guards: &[(3, Token::Lacp), (4, Token::QinQ)],
        fields: &[Field::Lacp, Field::QinQ, Field::Name],
    },
];

const SEVEN_TOKENS: &[Form] = &[Form {
    guards: &[(3, Token::Lacp), (4, Token::NoFallback), (5, Token::QinQ)],
    fields: &[Field::Lacp, Field::NoFallback, Field::QinQ, Field::Name],
}];

fn forms(count: usize) -> &'static [Form] {
    match count {
        3 => THREE_TOKENS,
        4 => FOUR_TOKENS,
        5 => FIVE_TOKENS,
        6 => SIX_TOKENS,
        7 => SEVEN_TOKENS,
        _ => &[],
    }
}

/// Parse a bond spec such as `0,1,balance-tcp,active,no-lacp-fallback,qinq`.
///
/// Everything before the first bond mode token is an interface index. The
/// trailing LACP mode, fallback, QinQ and name fields are located by their
/// absolute position in the spec, which assumes exactly two interfaces.
pub fn parse_bond_spec(spec: &str) -> Result<BondConfig> {
    let tokens: Vec<&str> = spec.split(',').collect();
    let malformed = || SpecError::MalformedBondSpec(spec.to_string());

    if tokens.len() < 3 || tokens.len() > 7 {
        return Err(malformed());
    }

    let mode_pos = tokens
        .iter()
        .position(|token| is_bond_mode(token))
        .ok_or_else(malformed)?;

    // must provide at least two interface indexes
    if mode_pos < 2 {
        return Err(malformed());
    }

    let form = forms(tokens.len())
        .iter()
        .find(|form| {
            form.guards
                .iter()
                .all(|&(pos, token)| token.holds(tokens[pos]))
        })
        .ok_or_else(malformed)?;

    let mut bond = BondConfig {
        name: None,
        mode: tokens[mode_pos].parse()?,
        lacp: LacpMode::default(),
        fallback: true,
        qinq: false,
        interfaces: Vec::new(),
        bridge: None,
        vlan: None,
        raw: String::new(),
    };

    for (field, token) in form.fields.iter().zip(&tokens[TRAILING_START..]) {
        match field {
            Field::Lacp => bond.lacp = token.parse()?,
            Field::NoFallback => bond.fallback = false,
            Field::QinQ => bond.qinq = true,
            Field::Name if token.is_empty() => {}
            Field::Name => bond.name = Some(token.to_string()),
        }
    }

    bond.interfaces = tokens[..mode_pos]
        .iter()
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| SpecError::InvalidInterfaceIndex(token.to_string()))
        })
        .collect::<Result<_>>()?;

    debug!(
        "Parsed bondspec '{spec}': interfaces={:?}, mode={}, lacp={}, fallback={}, qinq={}, name={:?}",
        bond.interfaces, bond.mode, bond.lacp, bond.fallback, bond.qinq, bond.name
    );

    Ok(bond)
}
