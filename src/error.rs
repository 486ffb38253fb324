#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("malformed netspec: {0}")]
    MalformedNetSpec(String),

    #[error("malformed bondspec: {0}")]
    MalformedBondSpec(String),

    #[error("invalid interface index {0} provided in bondspec")]
    InvalidInterfaceIndex(String),

    /// A wifi spec passed the coordinate guards but a coordinate still failed
    /// to parse. Never caused by user input.
    #[error("unexpectedly failed to parse {axis} coordinate '{token}' (this is a bug)")]
    CoordinateParse { axis: char, token: String },

    #[error("no such interface {index} for vm {vm}")]
    InterfaceOutOfRange { index: usize, vm: String },

    #[error("interfaces being bonded are not on the same bridge: interface {index} is on {found}, bond is on {expected}")]
    BridgeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("interface {index} on vm {vm} is not on VLAN {expected} -- still defaulting to {expected} for bond")]
    VlanMismatch {
        index: usize,
        vm: String,
        expected: i32,
    },

    #[error("cannot bond wifi interfaces: interface {0} is a wifi station")]
    WifiBond(usize),

    #[error("unable to resolve VLAN alias '{alias}' in namespace '{namespace}'")]
    UnresolvedAlias { namespace: String, alias: String },

    #[error("unknown config field: {0}")]
    UnknownField(String),
}

impl SpecError {
    /// Whether the error indicates a defect in this crate rather than bad input.
    pub fn is_bug(&self) -> bool {
        matches!(self, SpecError::CoordinateParse { .. })
    }
}

pub type Result<T> = std::result::Result<T, SpecError>;

#[cfg(test)]
mod tests {
    use crate::error::SpecError;

    #[test]
    fn only_coordinate_failures_are_bugs() {
        let err = SpecError::CoordinateParse {
            axis: 'y',
            token: "2x".to_string(),
        };
        assert!(err.is_bug());
        assert_eq!(
            err.to_string(),
            "unexpectedly failed to parse y coordinate '2x' (this is a bug)"
        );

        assert!(!SpecError::MalformedNetSpec("a,b,c".to_string()).is_bug());
        assert!(!SpecError::WifiBond(1).is_bug());
    }

    #[test]
    fn vlan_mismatch_message() {
        let err = SpecError::VlanMismatch {
            index: 1,
            vm: "vm0".to_string(),
            expected: 101,
        };
        assert_eq!(
            err.to_string(),
            "interface 1 on vm vm0 is not on VLAN 101 -- still defaulting to 101 for bond"
        );
    }
}
