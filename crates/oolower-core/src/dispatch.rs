/*! Interface dispatch policy.
 *
 * One policy per session decides how calls through interface methods are resolved. The
 * method-to-function variant is the searched shape with one extra indirection, so it is
 * modeled as a field of `SearchedItable` rather than as a separate table shape.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ItableIndirection {
    /// Searched entry points straight at the method block.
    #[default]
    Direct,
    /// Searched entry points at a patchable cell holding the method block.
    MethodToFunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum InterfaceCallType {
    #[default]
    RuntimeLookup,
    SearchedItable {
        #[serde(default)]
        indirection: ItableIndirection,
    },
    IndexedItable,
}

impl InterfaceCallType {
    pub const SEARCHED_ITABLE: InterfaceCallType = InterfaceCallType::SearchedItable {
        indirection: ItableIndirection::Direct,
    };
    pub const SEARCHED_ITABLE_M2F: InterfaceCallType = InterfaceCallType::SearchedItable {
        indirection: ItableIndirection::MethodToFunction,
    };

    const RAW_SEARCHED: u32 = 1;
    const RAW_INDEXED: u32 = 2;
    const RAW_M2F_FLAG: u32 = 4;

    /// Decodes the legacy integer encoding. Unknown patterns fall back to runtime lookup.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            Self::RAW_SEARCHED => Self::SEARCHED_ITABLE,
            Self::RAW_INDEXED => InterfaceCallType::IndexedItable,
            r if r == Self::RAW_SEARCHED | Self::RAW_M2F_FLAG => Self::SEARCHED_ITABLE_M2F,
            _ => InterfaceCallType::RuntimeLookup,
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            InterfaceCallType::RuntimeLookup => 0,
            InterfaceCallType::SearchedItable {
                indirection: ItableIndirection::Direct,
            } => Self::RAW_SEARCHED,
            InterfaceCallType::SearchedItable {
                indirection: ItableIndirection::MethodToFunction,
            } => Self::RAW_SEARCHED | Self::RAW_M2F_FLAG,
            InterfaceCallType::IndexedItable => Self::RAW_INDEXED,
        }
    }

    /// Whether classes carry an itable under this policy.
    pub fn uses_itable(self) -> bool {
        !matches!(self, InterfaceCallType::RuntimeLookup)
    }

    pub fn is_searched(self) -> bool {
        matches!(self, InterfaceCallType::SearchedItable { .. })
    }

    pub fn indirection(self) -> ItableIndirection {
        match self {
            InterfaceCallType::SearchedItable { indirection } => indirection,
            _ => ItableIndirection::Direct,
        }
    }
}

impl fmt::Display for InterfaceCallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InterfaceCallType::RuntimeLookup => "runtime-lookup",
            InterfaceCallType::SearchedItable {
                indirection: ItableIndirection::Direct,
            } => "searched-itable",
            InterfaceCallType::SearchedItable {
                indirection: ItableIndirection::MethodToFunction,
            } => "searched-itable-m2f",
            InterfaceCallType::IndexedItable => "indexed-itable",
        };
        f.write_str(text)
    }
}

impl FromStr for InterfaceCallType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "runtime-lookup" | "runtime" => Ok(InterfaceCallType::RuntimeLookup),
            "searched-itable" | "searched" => Ok(Self::SEARCHED_ITABLE),
            "searched-itable-m2f" | "m2f" => Ok(Self::SEARCHED_ITABLE_M2F),
            "indexed-itable" | "indexed" => Ok(InterfaceCallType::IndexedItable),
            other => Err(format!("unknown interface call type '{}'", other)),
        }
    }
}

/// The session's single policy slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchPolicy {
    current: InterfaceCallType,
}

impl DispatchPolicy {
    pub fn new(initial: InterfaceCallType) -> Self {
        Self { current: initial }
    }

    pub fn set(&mut self, call_type: InterfaceCallType) {
        self.current = call_type;
    }

    pub fn set_raw(&mut self, raw: u32) {
        self.current = InterfaceCallType::from_raw(raw);
    }

    pub fn get(&self) -> InterfaceCallType {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_runtime_lookup() {
        assert_eq!(DispatchPolicy::default().get(), InterfaceCallType::RuntimeLookup);
        assert!(!InterfaceCallType::default().uses_itable());
    }

    #[test]
    fn test_set_get() {
        let mut policy = DispatchPolicy::default();
        policy.set(InterfaceCallType::IndexedItable);
        assert_eq!(policy.get(), InterfaceCallType::IndexedItable);
        policy.set(InterfaceCallType::SEARCHED_ITABLE_M2F);
        assert_eq!(policy.get(), InterfaceCallType::SEARCHED_ITABLE_M2F);
    }

    #[test]
    fn test_m2f_shares_searched_shape() {
        let m2f = InterfaceCallType::SEARCHED_ITABLE_M2F;
        assert!(m2f.is_searched());
        assert_eq!(m2f.indirection(), ItableIndirection::MethodToFunction);
        assert_eq!(
            InterfaceCallType::SEARCHED_ITABLE.indirection(),
            ItableIndirection::Direct
        );
    }

    #[test]
    fn test_raw_encoding() {
        assert_eq!(InterfaceCallType::from_raw(0), InterfaceCallType::RuntimeLookup);
        assert_eq!(InterfaceCallType::from_raw(1), InterfaceCallType::SEARCHED_ITABLE);
        assert_eq!(InterfaceCallType::from_raw(2), InterfaceCallType::IndexedItable);
        assert_eq!(InterfaceCallType::from_raw(5), InterfaceCallType::SEARCHED_ITABLE_M2F);
        assert_eq!(InterfaceCallType::from_raw(6), InterfaceCallType::RuntimeLookup);
        assert_eq!(InterfaceCallType::SEARCHED_ITABLE_M2F.to_raw(), 5);

        let mut policy = DispatchPolicy::default();
        policy.set_raw(99);
        assert_eq!(policy.get(), InterfaceCallType::RuntimeLookup);
    }

    #[test]
    fn test_parse_display() {
        for call_type in [
            InterfaceCallType::RuntimeLookup,
            InterfaceCallType::SEARCHED_ITABLE,
            InterfaceCallType::SEARCHED_ITABLE_M2F,
            InterfaceCallType::IndexedItable,
        ] {
            assert_eq!(call_type.to_string().parse::<InterfaceCallType>(), Ok(call_type));
        }
        assert_eq!(
            "SEARCHED_ITABLE".parse::<InterfaceCallType>(),
            Ok(InterfaceCallType::SEARCHED_ITABLE)
        );
        assert!("hashed".parse::<InterfaceCallType>().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&InterfaceCallType::SEARCHED_ITABLE_M2F).unwrap();
        assert_eq!(
            json,
            r#"{"shape":"searched-itable","indirection":"MethodToFunction"}"#
        );
        let parsed: InterfaceCallType =
            serde_json::from_str(r#"{"shape":"indexed-itable"}"#).unwrap();
        assert_eq!(parsed, InterfaceCallType::IndexedItable);
        let searched: InterfaceCallType =
            serde_json::from_str(r#"{"shape":"searched-itable"}"#).unwrap();
        assert_eq!(searched, InterfaceCallType::SEARCHED_ITABLE);
    }
}
