use serde::{Deserialize, Serialize};
use strum::FromRepr;

/// A controller port on a console.
///
/// `PortAny` lets a client ask the server to pick any free port for it;
/// `Unknown` only ever appears in responses, never in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromRepr, Serialize, Deserialize)]
#[repr(i8)]
pub enum Port {
    Unknown = -1,
    PortAny = 0,
    Port1 = 1,
    Port2 = 2,
    Port3 = 3,
    Port4 = 4,
}

impl Port {
    pub const ALL_CONCRETE: [Port; 4] = [Port::Port1, Port::Port2, Port::Port3, Port::Port4];

    pub fn is_concrete(self) -> bool {
        matches!(self, Port::Port1 | Port::Port2 | Port::Port3 | Port::Port4)
    }

    pub fn is_wildcard(self) -> bool {
        matches!(self, Port::PortAny)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_order_is_by_repr_value() {
        let mut ports = vec![Port::PortAny, Port::Port3, Port::Port1];
        ports.sort();
        assert_eq!(ports, vec![Port::PortAny, Port::Port1, Port::Port3]);
    }

    #[test]
    fn only_port1_through_4_are_concrete() {
        for p in Port::ALL_CONCRETE {
            assert!(p.is_concrete());
        }
        assert!(!Port::PortAny.is_concrete());
        assert!(!Port::Unknown.is_concrete());
    }
}
