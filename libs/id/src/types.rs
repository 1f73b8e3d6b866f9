//! Typed ID and name definitions.

use crate::{define_id, define_name};

// =============================================================================
// Names
// =============================================================================

define_name!(ImageName, "image name");
define_name!(NodeAddress, "node address");

// =============================================================================
// IDs
// =============================================================================

define_id!(OperationId, "op");

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_operation_id_display() {
        let id = OperationId::new();
        let shown = id.to_string();
        assert!(shown.starts_with("op_"));
        assert_eq!(shown.len(), "op_".len() + 26);
        assert_ne!(shown, OperationId::new().to_string());
    }

    #[test]
    fn test_operation_id_sortable() {
        let id1 = OperationId::new();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let id2 = OperationId::new();
        assert!(id1 < id2);
    }

    #[test]
    fn test_image_name_is_opaque() {
        let name = ImageName::parse("registry.example.com:5000/team/api@sha256:abc").unwrap();
        assert_eq!(name.as_str(), "registry.example.com:5000/team/api@sha256:abc");
        assert_eq!(name.to_string(), name.as_str());
    }

    #[test]
    fn test_name_rejects_empty() {
        let err = NodeAddress::parse("").unwrap_err();
        assert!(err.is_empty());
        assert_eq!(err.to_string(), "node address cannot be empty");
    }

    #[test]
    fn test_name_rejects_control_characters() {
        let err = ImageName::parse("busy\nbox").unwrap_err();
        assert!(matches!(err, crate::IdError::InvalidName { .. }));
    }

    #[test]
    fn test_name_serializes_as_plain_string() {
        let addr = NodeAddress::parse("http://10.0.0.7:2375").unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"http://10.0.0.7:2375\"");

        let err = serde_json::from_str::<NodeAddress>("\"\"");
        assert!(err.is_err());
    }

    proptest! {
        #[test]
        fn test_printable_names_always_parse(s in "[a-zA-Z0-9:/._@-]{1,64}") {
            let name = ImageName::parse(s.clone()).unwrap();
            prop_assert_eq!(name.as_str(), s.as_str());
        }
    }
}
