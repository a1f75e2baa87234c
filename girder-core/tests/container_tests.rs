use girder_core::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

static REGISTERED: Mutex<Vec<&'static str>> = parking_lot::const_mutex(Vec::new());

struct Clock;

#[async_trait]
impl Injectable for Clock {
    async fn register() -> Result<Vec<Dependency>> {
        // Slow registration: later classes must still wait their turn.
        tokio::time::sleep(Duration::from_millis(20)).await;
        REGISTERED.lock().push("Clock");
        Ok(vec![])
    }

    fn construct(_deps: &mut Dependencies) -> Result<Self> {
        Ok(Clock)
    }
}

struct Audit {
    clock: Arc<Clock>,
}

#[async_trait]
impl Injectable for Audit {
    async fn register() -> Result<Vec<Dependency>> {
        REGISTERED.lock().push("Audit");
        Ok(vec![Dependency::on::<Clock>()])
    }

    fn construct(deps: &mut Dependencies) -> Result<Self> {
        Ok(Self { clock: deps.next()? })
    }
}

struct Billing {
    clock: Arc<Clock>,
    audit: Arc<Audit>,
}

#[async_trait]
impl Injectable for Billing {
    async fn register() -> Result<Vec<Dependency>> {
        REGISTERED.lock().push("Billing");
        Ok(vec![Dependency::on::<Clock>(), Dependency::on::<Audit>()])
    }

    fn construct(deps: &mut Dependencies) -> Result<Self> {
        Ok(Self {
            clock: deps.next()?,
            audit: deps.next()?,
        })
    }
}

#[tokio::test]
async fn test_registration_order_and_singleton_sharing() {
    let registry = Registry::new();
    registry.register_service::<Clock>().unwrap();
    registry.register_service::<Audit>().unwrap();
    registry.register_service::<Billing>().unwrap();

    let container = Container::new(registry);
    container.build().await.unwrap();
    assert!(container.is_built());
    assert_eq!(*REGISTERED.lock(), vec!["Clock", "Audit", "Billing"]);

    let billing = container.resolve::<Billing>().unwrap();
    let audit = container.resolve::<Audit>().unwrap();
    let clock = container.resolve::<Clock>().unwrap();

    assert!(Arc::ptr_eq(&billing.audit, &audit));
    assert!(Arc::ptr_eq(&billing.clock, &clock));
    assert!(Arc::ptr_eq(&audit.clock, &clock));
}

#[tokio::test]
async fn test_resolve_unregistered() {
    let container = Container::new(Registry::new());
    container.build().await.unwrap();

    let err = container.resolve::<Clock>().err().unwrap();
    assert!(matches!(err, Error::Registration(RegistrationError::NotFound(_))));
}

#[tokio::test]
async fn test_rebuild_starts_with_fresh_instances() {
    struct Counter;

    #[async_trait]
    impl Injectable for Counter {
        async fn register() -> Result<Vec<Dependency>> {
            Ok(vec![])
        }

        fn construct(_deps: &mut Dependencies) -> Result<Self> {
            Ok(Counter)
        }
    }

    let registry = Registry::new();
    registry.register_service::<Counter>().unwrap();

    let container = Container::new(registry);
    container.build().await.unwrap();
    let first = container.resolve::<Counter>().unwrap();
    assert!(Arc::ptr_eq(&first, &container.resolve::<Counter>().unwrap()));

    container.build().await.unwrap();
    let second = container.resolve::<Counter>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn test_key_stable_until_unregistered() {
    let registry = Registry::new();
    let key = registry.register_service::<Clock>().unwrap();

    for _ in 0..3 {
        assert_eq!(registry.registration_key::<Clock>().unwrap(), key);
    }
    assert!(registry.register_service::<Clock>().is_err());

    registry.unregister(key).unwrap();
    assert!(registry.registration_key::<Clock>().is_err());
}
