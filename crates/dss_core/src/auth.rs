use std::collections::HashMap;

/// Scope required to read identification service areas and to manage
/// subscriptions over them.
pub const READ_ISA_SCOPE: &str = "dss.read.identification_service_areas";
/// Scope required to mutate identification service areas.
pub const WRITE_ISA_SCOPE: &str = "dss.write.identification_service_areas";

/// Scope each public operation demands. Consumed by the handler layer when
/// validating access tokens.
pub fn operation_scopes() -> HashMap<&'static str, Vec<&'static str>> {
    HashMap::from([
        ("GetIdentificationServiceArea", vec![READ_ISA_SCOPE]),
        ("PutIdentificationServiceArea", vec![WRITE_ISA_SCOPE]),
        ("PatchIdentificationServiceArea", vec![WRITE_ISA_SCOPE]),
        ("DeleteIdentificationServiceArea", vec![WRITE_ISA_SCOPE]),
        ("SearchIdentificationServiceAreas", vec![READ_ISA_SCOPE]),
        ("GetSubscription", vec![READ_ISA_SCOPE]),
        ("PutSubscription", vec![READ_ISA_SCOPE]),
        ("PatchSubscription", vec![READ_ISA_SCOPE]),
        ("DeleteSubscription", vec![READ_ISA_SCOPE]),
        ("SearchSubscriptions", vec![READ_ISA_SCOPE]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_has_a_scope() {
        let scopes = operation_scopes();
        assert_eq!(scopes.len(), 10);
        for required in scopes.values() {
            assert!(!required.is_empty());
        }
        assert_eq!(
            scopes["PutIdentificationServiceArea"],
            vec![WRITE_ISA_SCOPE]
        );
        assert_eq!(scopes["SearchSubscriptions"], vec![READ_ISA_SCOPE]);
    }
}
