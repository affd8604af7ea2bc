use llmflow_core::ChatRequest;
use sha2::{Digest, Sha256};

/// Deterministic SHA-256 fingerprint of everything about a request that
/// affects the response: model, messages, tools, and generation
/// parameters. `serde_json`'s `preserve_order` feature is deliberately
/// *not* relied on here -- fields are serialized through `ChatRequest`'s
/// derived `Serialize`, whose field order is fixed by struct definition
/// order, so the fingerprint is stable across processes without needing
/// to sort keys by hand.
pub fn fingerprint_request(request: &ChatRequest) -> String {
    let canonical = serde_json::to_vec(request).expect("ChatRequest always serializes");
    let digest = Sha256::digest(&canonical);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmflow_core::Message;

    #[test]
    fn identical_requests_fingerprint_identically() {
        let a = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        let b = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        assert_eq!(fingerprint_request(&a), fingerprint_request(&b));
    }

    #[test]
    fn different_messages_fingerprint_differently() {
        let a = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        let b = ChatRequest::new("gpt-4o-mini", vec![Message::user("bye")]);
        assert_ne!(fingerprint_request(&a), fingerprint_request(&b));
    }

    #[test]
    fn different_temperature_fingerprints_differently() {
        let mut a = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        let mut b = a.clone();
        a.temperature = Some(0.0);
        b.temperature = Some(1.0);
        assert_ne!(fingerprint_request(&a), fingerprint_request(&b));
    }
}
