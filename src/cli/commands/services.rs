//! Service management commands.

use tokio::runtime::Runtime;

use super::registered;
use crate::model::SourceType;
use crate::registry::ServiceRegistry;
use crate::service::MusicService;

fn status_line(service: &MusicService) -> String {
    let mut line = format!(
        "{:<8} {:<20} {}",
        service.source().as_str(),
        service.name(),
        service.state()
    );
    if !service.available() {
        line.push_str(" (unavailable)");
    }
    line
}

/// List music services and their state
pub fn cmd_services(registry: &ServiceRegistry) -> anyhow::Result<()> {
    for service in registry.registered() {
        println!("{}", status_line(service));
    }
    Ok(())
}

/// Enable a music service and remember it
pub fn cmd_enable(rt: &Runtime, registry: &ServiceRegistry, source: SourceType) -> anyhow::Result<()> {
    let service = registered(registry, source)?;
    if !service.available() {
        anyhow::bail!(
            "{} is not available on this system, check the configuration",
            service.name()
        );
    }

    rt.block_on(service.enable())?;
    println!("Enabled {}", service.name());
    Ok(())
}

/// Disable a music service and remember it
pub fn cmd_disable(rt: &Runtime, registry: &ServiceRegistry, source: SourceType) -> anyhow::Result<()> {
    let service = registered(registry, source)?;
    rt.block_on(service.disable())?;
    println!("Disabled {}", service.name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectCache;
    use crate::store::MemoryStateStore;
    use crate::test_utils::{MockBackend, ScriptedResolver, shared_context};
    use std::sync::Arc;

    #[test]
    fn test_status_line_marks_unavailable_services() {
        let context = shared_context(
            Arc::new(ObjectCache::new()),
            Arc::new(ScriptedResolver::default()),
            Arc::new(MemoryStateStore::new()),
        );
        let mut registry = ServiceRegistry::new(context);
        registry.register(Arc::new(MockBackend::new(SourceType::Catalog).unavailable()));

        let service = registry.get(SourceType::Catalog).unwrap();
        let line = status_line(service);
        assert!(line.starts_with("catalog"));
        assert!(line.contains("MockCatalog"));
        assert!(line.ends_with("(unavailable)"));
    }

    #[test]
    fn test_enable_refuses_unavailable_service() {
        let rt = Runtime::new().unwrap();
        let context = shared_context(
            Arc::new(ObjectCache::new()),
            Arc::new(ScriptedResolver::default()),
            Arc::new(MemoryStateStore::new()),
        );
        let mut registry = ServiceRegistry::new(context);
        registry.register(Arc::new(MockBackend::new(SourceType::Local).unavailable()));

        assert!(cmd_enable(&rt, &registry, SourceType::Local).is_err());
        assert!(!registry.get(SourceType::Local).unwrap().is_enabled());
    }
}
