use callcache::{
    cache_identity, memoize, Bound, CallableIdentity, CallableKind, Error, InstanceKey,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[cache_identity]
fn exchange_rate(from: &str, to: &str) -> f64 {
    if from == to {
        1.0
    } else {
        0.5
    }
}

struct Warehouse {
    code: String,
    lookups: AtomicUsize,
}

impl InstanceKey for Warehouse {
    fn instance_key(&self) -> String {
        self.code.clone()
    }
}

impl Warehouse {
    #[cache_identity]
    fn stock(&self, sku: u32) -> u32 {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        sku % 7
    }

    #[cache_identity(classmethod)]
    fn capacity() -> u32 {
        1_000
    }
}

#[test]
fn test_free_function_identity() {
    let id = exchange_rate_identity().unwrap();
    assert_eq!(id.kind(), CallableKind::Function);
    assert_eq!(id.qualified_name(), "cache_identity_tests.exchange_rate");
    assert_eq!(exchange_rate("eur", "eur"), 1.0);
}

#[test]
fn test_free_function_identity_uses_module_path() {
    let generated = exchange_rate_identity().unwrap();
    let explicit = CallableIdentity::function(module_path!(), "exchange_rate").unwrap();
    assert_eq!(generated, explicit);
}

#[test]
fn test_method_identity() {
    let id = Warehouse::stock_identity().unwrap();
    assert_eq!(id.kind(), CallableKind::Method);
    assert_eq!(id.qualified_name(), "cache_identity_tests.Warehouse.stock");
}

#[test]
fn test_class_method_identity() {
    let id = Warehouse::capacity_identity().unwrap();
    assert_eq!(id.kind(), CallableKind::ClassMethod);
    assert_eq!(id.qualified_name(), "cache_identity_tests.Warehouse.capacity");
    assert_eq!(Warehouse::capacity(), 1_000);
}

#[tokio::test]
async fn test_memoized_method_through_generated_identity() {
    let cached = memoize(60)
        .wrap_as(
            Warehouse::stock_identity().unwrap(),
            |call: Bound<Arc<Warehouse>, (u32,)>| async move {
                Ok::<_, Error>(call.receiver.stock(call.args.0))
            },
        )
        .unwrap();

    let north = Arc::new(Warehouse {
        code: "north".to_string(),
        lookups: AtomicUsize::new(0),
    });

    assert_eq!(cached.call(Bound::new(north.clone(), (15,))).await.unwrap(), 1);
    assert_eq!(cached.call(Bound::new(north.clone(), (15,))).await.unwrap(), 1);
    assert_eq!(north.lookups.load(Ordering::SeqCst), 1);

    let key = cached.cache_key(&Bound::new(north, (15,))).unwrap();
    assert_eq!(
        key.as_str(),
        r#"[cached]cache_identity_tests.Warehouse.stock|method@"north"|[15]|{}"#
    );
}
