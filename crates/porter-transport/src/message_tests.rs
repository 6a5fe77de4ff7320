//! Tests for message, address, and lease types.

use super::*;

// ============================================================================
// Address Tests
// ============================================================================

#[test]
fn test_address_is_case_normalized() {
    let upper = Address::new("Orders").unwrap();
    let lower = Address::new("orders").unwrap();

    assert_eq!(upper, lower);
    assert_eq!(upper.as_str(), "orders");
}

#[test]
fn test_address_validation() {
    // Valid names
    assert!(Address::new("orders").is_ok());
    assert!(Address::new("order-events-2").is_ok());
    assert!(Address::new("q1").is_ok());

    // Invalid names
    assert!(Address::new("").is_err());
    assert!(Address::new(&"a".repeat(64)).is_err());
    assert!(Address::new("-leading").is_err());
    assert!(Address::new("trailing-").is_err());
    assert!(Address::new("double--hyphen").is_err());
    assert!(Address::new("under_score").is_err());
    assert!(Address::new("spaced name").is_err());
}

#[test]
fn test_address_from_str() {
    let address: Address = "Orders".parse().unwrap();
    assert_eq!(address.as_str(), "orders");

    let result: Result<Address, _> = "not valid!".parse();
    assert!(result.is_err());
}

// ============================================================================
// MessageId Tests
// ============================================================================

#[test]
fn test_message_id_generation_is_unique() {
    let id1 = MessageId::new();
    let id2 = MessageId::new();

    assert_ne!(id1, id2);
    assert!(!id1.as_str().is_empty());
}

#[test]
fn test_message_id_from_service_assigned_string() {
    let id = MessageId::from("5974b586-0df3-4e2d-ad0c-18e3892bfca2".to_string());
    assert_eq!(id.as_str(), "5974b586-0df3-4e2d-ad0c-18e3892bfca2");
}

// ============================================================================
// Lease Tests
// ============================================================================

#[test]
fn test_lease_token_accessors() {
    let id = MessageId::new();
    let token = LeaseToken::new(id.clone(), "receipt-1".to_string());

    assert_eq!(token.message_id(), &id);
    assert_eq!(token.pop_receipt(), "receipt-1");
}

// ============================================================================
// TransportMessage Tests
// ============================================================================

#[test]
fn test_transport_message_builder() {
    let message = TransportMessage::new(HashMap::new(), Bytes::from_static(b"payload"))
        .with_header("type".to_string(), "Ping".to_string())
        .with_header("source".to_string(), "tests".to_string());

    assert_eq!(message.headers().len(), 2);
    assert_eq!(message.headers().get("type"), Some(&"Ping".to_string()));
    assert_eq!(message.body().as_ref(), b"payload");
}

#[test]
fn test_transport_message_into_parts() {
    let mut headers = HashMap::new();
    headers.insert("type".to_string(), "Ping".to_string());
    let message = TransportMessage::new(headers.clone(), Bytes::from_static(b"\x01\x02"));

    let (split_headers, body) = message.into_parts();

    assert_eq!(split_headers, headers);
    assert_eq!(body.as_ref(), &[0x01, 0x02]);
}
