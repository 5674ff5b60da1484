//! The manager's topic taxonomy (spec §4.4). Topics are `/`-separated
//! paths; `*` matches exactly one path segment, the same convention a
//! NATS subject wildcard uses, which is why [`to_nats_subject`] is a
//! straight separator swap rather than a real translation.

/// The wildcard segment matching every property, or every value of
/// whatever positional segment it occupies.
pub const WILDCARD: &str = "*";

pub fn driver_status() -> String {
    "driver-status".to_string()
}

pub fn device_status(protocol_id: &str) -> String {
    format!("device-status/{protocol_id}")
}

pub fn device_props(protocol_id: &str, product_id: &str, device_id: &str, property_id: &str) -> String {
    format!("device-props/{protocol_id}/{product_id}/{device_id}/{property_id}")
}

pub fn device_event(protocol_id: &str, product_id: &str, device_id: &str, event: &str) -> String {
    format!("device-event/{protocol_id}/{product_id}/{device_id}/{event}")
}

/// The request/reply topic a driver for `protocol_id` listens on for
/// [`crate::client::ClientRequest`]s.
pub fn driver_cmd(protocol_id: &str) -> String {
    format!("driver-cmd/{protocol_id}")
}

/// Converts a manager topic into a NATS subject by swapping `/`
/// separators for `.`; NATS already treats `*` as a single-token
/// wildcard, so no other rewriting is needed.
pub fn to_nats_subject(topic: &str) -> String {
    topic.replace('/', ".")
}

/// True if `topic` (a concrete, published-to topic with no wildcards)
/// matches `pattern` (a subscription, which may contain `*` segments).
pub fn matches(pattern: &str, topic: &str) -> bool {
    let mut p = pattern.split('/');
    let mut t = topic.split('/');

    loop {
        match (p.next(), t.next()) {
            (None, None) => return true,
            (Some(ps), Some(ts)) => {
                if ps != WILDCARD && ps != ts {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_single_segment() {
        let pattern = device_props("p1", "prod1", "dev1", WILDCARD);
        let topic = device_props("p1", "prod1", "dev1", "temp");
        assert!(matches(&pattern, &topic));
    }

    #[test]
    fn mismatched_segment_count_does_not_match() {
        assert!(!matches("device-status/p1", "device-status/p1/extra"));
    }

    #[test]
    fn nats_subject_swaps_separators_only() {
        assert_eq!(to_nats_subject("device-props/p1/prod1/dev1/*"), "device-props.p1.prod1.dev1.*");
    }
}
