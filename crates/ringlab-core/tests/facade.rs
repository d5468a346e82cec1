use std::sync::Arc;

use ringlab_core::{Config, Dht, Value};
use ringlab_transport::InMemoryTransport;

fn config() -> Config {
    Config {
        m: 8,
        b: 2,
        leaf_half: 4,
        btree_order: 4,
        ..Config::default()
    }
}

/// Both protocols answer the same DHT contract through one facade type.
#[test]
fn chord_and_pastry_both_satisfy_the_facade() {
    for dht in [
        Dht::chord(Arc::new(InMemoryTransport::new()), config()).unwrap(),
        Dht::pastry(Arc::new(InMemoryTransport::new()), config()).unwrap(),
    ] {
        let ids = [10u64, 50, 100, 150, 200];
        let bindings = vec![("alpha".to_string(), Value::Text("A".to_string()))];
        dht.build(&ids, &bindings).unwrap();

        let mut observed = dht.all_node_ids();
        observed.sort_unstable();
        assert_eq!(observed, vec![10, 50, 100, 150, 200]);

        let (values, _) = dht.lookup("alpha", None).unwrap();
        assert_eq!(values, vec![Value::Text("A".to_string())]);

        dht.insert("beta", Value::Text("B".to_string()), None).unwrap();
        let (values, _) = dht.lookup("beta", None).unwrap();
        assert_eq!(values, vec![Value::Text("B".to_string())]);

        dht.update("beta", Value::Text("B2".to_string()), None).unwrap();
        let (values, _) = dht.lookup("beta", None).unwrap();
        assert_eq!(values, vec![Value::Text("B2".to_string())]);

        dht.delete("beta", None).unwrap();
        let (values, _) = dht.lookup("beta", None).unwrap();
        assert!(values.is_empty());

        assert_eq!(dht.join(10).unwrap(), 0, "already present, should be a no-op");
        dht.join(75).unwrap();
        let mut observed = dht.all_node_ids();
        observed.sort_unstable();
        assert_eq!(observed, vec![10, 50, 75, 100, 150, 200]);

        dht.leave(75, true).unwrap();
        let mut observed = dht.all_node_ids();
        observed.sort_unstable();
        assert_eq!(observed, vec![10, 50, 100, 150, 200]);
    }
}

#[test]
fn delete_value_removes_one_binding_without_touching_the_rest() {
    let dht = Dht::chord(Arc::new(InMemoryTransport::new()), config()).unwrap();
    dht.build(&[10, 50, 100], &[]).unwrap();

    dht.insert("k", Value::Text("v1".to_string()), None).unwrap();
    dht.insert("k", Value::Text("v2".to_string()), None).unwrap();
    dht.delete_value("k", Value::Text("v1".to_string()), None).unwrap();

    let (values, _) = dht.lookup("k", None).unwrap();
    assert_eq!(values, vec![Value::Text("v2".to_string())]);
}

#[test]
fn build_rejects_an_empty_node_list() {
    let dht = Dht::chord(Arc::new(InMemoryTransport::new()), config()).unwrap();
    assert!(dht.build(&[], &[]).is_err());
}

#[test]
fn invalid_config_is_rejected_before_any_ring_is_built() {
    let bad = Config {
        m: 0,
        ..Config::default()
    };
    assert!(Dht::chord(Arc::new(InMemoryTransport::new()), bad).is_err());
}
