//! Регистрация сервисов и построенный контейнер.
//!
//! `ServiceCollection` — mutable фаза конфигурации: регистрации
//! instance / transient / singleton под `TypeId`. `build()` замораживает
//! набор в `BuiltProvider`, который лениво материализует singleton'ы и
//! поддерживает идемпотентный `dispose()`.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::provider::{erase, recover, ErasedService, ServiceProvider};

/// Фабрика сервиса: получает провайдер для разрешения зависимостей.
pub type ServiceFactory =
    Box<dyn Fn(&dyn ServiceProvider) -> Result<ErasedService> + Send + Sync>;

/// Хук, вызываемый при остановке контейнера для материализованного singleton'а.
type ShutdownHook = Arc<dyn Fn(ErasedService) + Send + Sync>;

enum Registration {
    /// Готовый экземпляр, отдаётся как есть.
    Instance(ErasedService),
    /// Новый экземпляр на каждый запрос.
    Transient(ServiceFactory),
    /// Один экземпляр на контейнер, создаётся при первом запросе.
    Singleton {
        factory: ServiceFactory,
        shutdown: Option<ShutdownHook>,
    },
}

/// Набор регистраций сервисов. Фаза конфигурации перед `build()`.
#[derive(Default)]
pub struct ServiceCollection {
    registrations: HashMap<TypeId, Registration>,
    type_names: HashMap<TypeId, &'static str>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert<I>(&mut self, registration: Registration) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<I>();
        let type_name = std::any::type_name::<I>();
        if self.registrations.insert(type_id, registration).is_some() {
            debug!("registration for {type_name} replaced");
        } else {
            debug!("registered {type_name}");
        }
        self.type_names.insert(type_id, type_name);
        self
    }

    /// Зарегистрировать готовый экземпляр под интерфейсом `I`.
    pub fn add_instance<I>(&mut self, instance: Arc<I>) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.insert::<I>(Registration::Instance(erase(instance)))
    }

    /// Зарегистрировать значение, обёрнутое в `Arc` на месте.
    pub fn add_value<I>(&mut self, value: I) -> &mut Self
    where
        I: Send + Sync + 'static,
    {
        self.add_instance(Arc::new(value))
    }

    /// Зарегистрировать transient-фабрику: вызывается на каждый запрос `I`.
    pub fn add_transient<I, F>(&mut self, factory: F) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceProvider) -> Result<Arc<I>> + Send + Sync + 'static,
    {
        self.insert::<I>(Registration::Transient(Box::new(move |provider| {
            factory(provider).map(erase)
        })))
    }

    /// Зарегистрировать singleton-фабрику без хука остановки.
    pub fn add_singleton<I, F>(&mut self, factory: F) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceProvider) -> Result<Arc<I>> + Send + Sync + 'static,
    {
        self.insert::<I>(Registration::Singleton {
            factory: Box::new(move |provider| factory(provider).map(erase)),
            shutdown: None,
        })
    }

    /// Зарегистрировать singleton с хуком, вызываемым при `dispose()`
    /// контейнера. Хук получает экземпляр только если тот успел
    /// материализоваться.
    pub fn add_singleton_with_shutdown<I, F, S>(&mut self, factory: F, shutdown: S) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn ServiceProvider) -> Result<Arc<I>> + Send + Sync + 'static,
        S: Fn(Arc<I>) + Send + Sync + 'static,
    {
        let hook: ShutdownHook = Arc::new(move |erased| {
            match recover::<I>(erased) {
                Some(service) => shutdown(service),
                // Запись кэша всегда создаётся под тем же I; промах
                // означает повреждение инварианта, а не ошибку хука.
                None => warn!(
                    "shutdown hook for {} received mismatched instance",
                    std::any::type_name::<I>()
                ),
            }
        });
        self.insert::<I>(Registration::Singleton {
            factory: Box::new(move |provider| factory(provider).map(erase)),
            shutdown: Some(hook),
        })
    }

    pub fn contains<I>(&self) -> bool
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.registrations.contains_key(&TypeId::of::<I>())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Заморозить набор в готовый провайдер.
    pub fn build(self) -> BuiltProvider {
        debug!("building provider with {} registrations", self.registrations.len());
        BuiltProvider {
            registrations: self.registrations,
            type_names: self.type_names,
            singletons: RwLock::new(HashMap::new()),
            disposers: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }
}

/// Замороженный контейнер: immutable регистрации + ленивый кэш singleton'ов.
pub struct BuiltProvider {
    registrations: HashMap<TypeId, Registration>,
    type_names: HashMap<TypeId, &'static str>,
    singletons: RwLock<HashMap<TypeId, ErasedService>>,
    disposers: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    disposed: AtomicBool,
}

impl BuiltProvider {
    fn type_name(&self, type_id: TypeId) -> &'static str {
        self.type_names.get(&type_id).copied().unwrap_or("<unknown>")
    }

    /// Материализовать singleton. Фабрика исполняется ВНЕ блокировки,
    /// иначе реентерабельное разрешение зависимостей через тот же
    /// контейнер приводило бы к deadlock. При гонке публикуется первый
    /// записанный экземпляр, проигравшая копия отбрасывается.
    fn materialize_singleton(
        &self,
        type_id: TypeId,
        factory: &ServiceFactory,
        shutdown: &Option<ShutdownHook>,
    ) -> Result<ErasedService> {
        if let Some(cached) = self.singletons.read().get(&type_id) {
            return Ok(Arc::clone(cached));
        }

        let built = factory(self)?;

        let mut cache = self.singletons.write();
        if let Some(winner) = cache.get(&type_id) {
            debug!(
                "singleton {} already materialized by a racing caller",
                self.type_name(type_id)
            );
            return Ok(Arc::clone(winner));
        }
        cache.insert(type_id, Arc::clone(&built));
        drop(cache);

        debug!("materialized singleton {}", self.type_name(type_id));
        if let Some(hook) = shutdown {
            let hook = Arc::clone(hook);
            let instance = Arc::clone(&built);
            self.disposers
                .lock()
                .push(Box::new(move || hook(instance)));
        }
        Ok(built)
    }

    /// Остановить контейнер: вызвать хуки материализованных singleton'ов.
    /// Идемпотентен; хуки исполняются ровно один раз, в порядке
    /// материализации.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks: Vec<_> = self.disposers.lock().drain(..).collect();
        debug!("disposing provider, {} shutdown hooks", hooks.len());
        for hook in hooks {
            hook();
        }
    }
}

impl ServiceProvider for BuiltProvider {
    fn get_raw(&self, type_id: TypeId) -> Result<Option<ErasedService>> {
        match self.registrations.get(&type_id) {
            None => Ok(None),
            Some(Registration::Instance(instance)) => Ok(Some(Arc::clone(instance))),
            Some(Registration::Transient(factory)) => factory(self).map(Some),
            Some(Registration::Singleton { factory, shutdown }) => self
                .materialize_singleton(type_id, factory, shutdown)
                .map(Some),
        }
    }
}

/// Внутренний контракт первичного провайдера адаптера: разрешение плюс
/// управление временем жизни. Отдельный аксессор вместо trait upcasting,
/// чтобы не требовать новый компилятор.
pub(crate) trait PrimaryProvider: ServiceProvider {
    fn dispose(&self);
    fn as_service_provider(&self) -> &dyn ServiceProvider;
}

impl PrimaryProvider for BuiltProvider {
    fn dispose(&self) {
        BuiltProvider::dispose(self);
    }

    fn as_service_provider(&self) -> &dyn ServiceProvider {
        self
    }
}

/// Обёртка над внешним резолвером, чьим временем жизни владеет кто-то
/// другой: `dispose()` — no-op.
pub(crate) struct NonDisposableProvider {
    inner: Arc<dyn ServiceProvider>,
}

impl NonDisposableProvider {
    pub(crate) fn new(inner: Arc<dyn ServiceProvider>) -> Self {
        Self { inner }
    }
}

impl ServiceProvider for NonDisposableProvider {
    fn get_raw(&self, type_id: TypeId) -> Result<Option<ErasedService>> {
        self.inner.get_raw(type_id)
    }
}

impl PrimaryProvider for NonDisposableProvider {
    fn dispose(&self) {
        debug!("externally owned provider, skipping dispose");
    }

    fn as_service_provider(&self) -> &dyn ServiceProvider {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ServiceProviderExt;
    use std::sync::atomic::AtomicUsize;

    struct Config {
        name: String,
    }

    struct Repository {
        config: Arc<Config>,
    }

    #[test]
    fn instance_registration_returns_same_arc() {
        let config = Arc::new(Config {
            name: "prod".to_string(),
        });
        let mut services = ServiceCollection::new();
        services.add_instance(Arc::clone(&config));
        let provider = services.build();

        let resolved = provider
            .get::<Config>()
            .expect("resolution must succeed")
            .expect("instance is registered");
        assert!(Arc::ptr_eq(&config, &resolved));
    }

    #[test]
    fn transient_factory_runs_per_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut services = ServiceCollection::new();
        services.add_transient(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Config {
                name: "fresh".to_string(),
            }))
        });
        let provider = services.build();

        let first = provider.get_required::<Config>().expect("factory runs");
        let second = provider.get_required::<Config>().expect("factory runs");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn singleton_materializes_once_and_resolves_dependencies() {
        let mut services = ServiceCollection::new();
        services.add_value(Config {
            name: "shared".to_string(),
        });
        services.add_singleton(|provider| {
            Ok(Arc::new(Repository {
                config: provider.get_required::<Config>()?,
            }))
        });
        let provider = services.build();

        let first = provider.get_required::<Repository>().expect("singleton builds");
        let second = provider.get_required::<Repository>().expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.config.name, "shared");
    }

    #[test]
    fn shutdown_hook_fires_once_for_materialized_singleton() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&disposed);

        let mut services = ServiceCollection::new();
        services.add_singleton_with_shutdown(
            |_| {
                Ok(Arc::new(Config {
                    name: "closable".to_string(),
                }))
            },
            move |_: Arc<Config>| {
                observed.fetch_add(1, Ordering::SeqCst);
            },
        );
        let provider = services.build();

        provider.get_required::<Config>().expect("materialize");
        provider.dispose();
        provider.dispose();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_hook_skipped_when_singleton_never_built() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&disposed);

        let mut services = ServiceCollection::new();
        services.add_singleton_with_shutdown(
            |_| {
                Ok(Arc::new(Config {
                    name: "untouched".to_string(),
                }))
            },
            move |_: Arc<Config>| {
                observed.fetch_add(1, Ordering::SeqCst);
            },
        );
        let provider = services.build();

        provider.dispose();
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_type_is_a_miss_not_an_error() {
        let provider = ServiceCollection::new().build();
        assert!(provider.get::<Config>().expect("miss is ok").is_none());
    }

    #[test]
    fn replacing_a_registration_keeps_last_one() {
        let mut services = ServiceCollection::new();
        services.add_value(Config {
            name: "first".to_string(),
        });
        services.add_value(Config {
            name: "second".to_string(),
        });
        assert_eq!(services.len(), 1);

        let provider = services.build();
        let resolved = provider.get_required::<Config>().expect("registered");
        assert_eq!(resolved.name, "second");
    }
}
