// packages/engine/tests/decode_properties.rs
//! Totality and determinism of the structural decoder

use proptest::prelude::*;
use std::sync::Arc;
use wirelens_engine::schema::{Decoder, DecoderConfig, SchemaRegistry};

const SCHEMA: &str = r#"
syntax = "proto3";
package shop;

message Item {
  string sku = 1;
  sint64 delta = 2;
  repeated fixed32 tags = 3;
  Item child = 4;
  map<string, int32> counts = 5;
}

message Empty {}
"#;

fn decoder() -> Decoder {
    let registry = Arc::new(SchemaRegistry::new());
    registry.register("shop", SCHEMA).unwrap();
    Decoder::new(registry, DecoderConfig::default())
}

proptest! {
    #[test]
    fn decode_is_total_and_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let decoder = decoder();
        let first = decoder.decode(&bytes, None);
        let second = decoder.decode(&bytes, None);
        prop_assert_eq!(&first, &second);

        if first.success {
            prop_assert!(first.data.is_some());
            prop_assert_eq!(first.schema_name.as_deref(), Some("shop"));
        } else {
            prop_assert!(first.data.is_none());
        }
    }

    #[test]
    fn hint_never_panics(
        bytes in proptest::collection::vec(any::<u8>(), 0..64),
        hint in "[a-zA-Z]{0,6}",
    ) {
        let decoder = decoder();
        let _ = decoder.decode(&bytes, Some(&hint));
    }
}

#[test]
fn test_empty_input_misses() {
    let result = decoder().decode(&[], None);
    assert!(!result.success);
    assert!(result.message_type.is_none());
}

#[test]
fn test_nested_message_decodes() {
    // Item { sku: "a", child: Item { delta: -1 } }
    let bytes = [0x0a, 0x01, b'a', 0x22, 0x02, 0x10, 0x01];
    let result = decoder().decode(&bytes, Some("SHOP"));

    assert!(result.success);
    assert_eq!(result.message_type.as_deref(), Some("shop.Item"));
    let data = result.data.unwrap();
    assert_eq!(data["sku"], "a");
    assert_eq!(data["child"]["delta"], -1);
}
