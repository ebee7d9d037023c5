use std::sync::Arc;

use dragon_conf::config::{system, MapSource, PropertySource};
use dragon_conf::spi::{self, ServiceError, ServiceRegistry};
use dragon_conf::{Configuration, Error};

// The provider is process-global, so the whole lifecycle runs in one test.
#[test]
fn test_global_configuration_lifecycle() {
    system::set_property("provider.test.key", "from-system");

    let first = spi::configuration().unwrap();
    assert_eq!(
        first.get("provider.test.key").unwrap().as_deref(),
        Some("from-system")
    );
    let names: Vec<&str> = first
        .context()
        .property_sources()
        .iter()
        .map(|s| s.name())
        .collect();
    assert!(names.contains(&"system-properties"));
    assert!(names.contains(&"environment-properties"));

    // cached: the same context is handed out
    let second = spi::configuration().unwrap();
    assert!(std::ptr::eq(first.context(), second.context()));

    let custom = Configuration::builder()
        .add_source(MapSource::new("custom", [("only", "here")]))
        .build()
        .unwrap();
    spi::set_configuration(custom);
    assert_eq!(
        spi::configuration().unwrap().get("only").unwrap().as_deref(),
        Some("here")
    );

    let registry = ServiceRegistry::new();
    let source: Arc<dyn PropertySource> =
        Arc::new(MapSource::new("registered", [("svc.key", "svc")]));
    registry.register("registered", 10, source).unwrap();
    spi::set_service_context(Arc::new(registry));
    spi::reset_configuration();

    let rebuilt = spi::configuration().unwrap();
    assert_eq!(rebuilt.get("svc.key").unwrap().as_deref(), Some("svc"));
    assert!(rebuilt.get("provider.test.key").unwrap().is_none());

    let booted = spi::bootstrap(|registry| {
        let source: Arc<dyn PropertySource> =
            Arc::new(MapSource::new("boot", [("boot.key", "${provider.test.key}")]).with_ordinal(5));
        registry.register("boot", 1, source)
    })
    .unwrap();
    assert_eq!(booted.get("boot.key").unwrap().as_deref(), Some("from-system"));
    assert!(spi::service_context().names::<dyn PropertySource>().contains(&"boot".to_string()));

    let failed = spi::bootstrap(|registry| {
        let source: Arc<dyn PropertySource> = Arc::new(MapSource::new("dup", [("a", "b")]));
        registry.register("dup", 1, Arc::clone(&source))?;
        registry.register("dup", 2, source)
    });
    assert!(matches!(
        failed,
        Err(Error::Service(ServiceError::Duplicate { .. }))
    ));
    // nothing was installed by the failed bootstrap
    assert!(spi::configuration().unwrap().get("boot.key").unwrap().is_some());

    system::remove_property("provider.test.key");
}
