//! Адаптер разрешения сервисов с трёхуровневым поиском.
//!
//! Порядок на каждый запрос:
//! 1. первичный контейнер (лениво строится из `ServiceCollection` при
//!    первом обращении, ровно один раз);
//! 2. fallback-резолвер, которого адаптер вытеснил при установке;
//! 3. прямое конструирование (`Activatable`) по закэшированной
//!    стратегии.
//!
//! Промах уровня — не ошибка, а переход к следующему. `Err` любого
//! уровня прерывает поиск. Контейнер, построенный адаптером, и
//! останавливается адаптером; внешний резолвер, переданный готовым,
//! живёт дольше адаптера и при `stop()` не трогается.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::activation::{self, Activatable, ActivationStrategy};
use crate::collection::{NonDisposableProvider, PrimaryProvider, ServiceCollection};
use crate::errors::{ResolveError, Result};
use crate::host::RegisteredObject;
use crate::provider::{ErasedService, ServiceProvider, ServiceProviderExt};
use crate::stats::{AdapterStats, StatsSnapshot};

const ADAPTER_NAME: &str = "webhost_di::ServiceProviderAdapter";

/// Источник первичного провайдера до первого разрешения.
enum ProviderSource {
    /// Регистрации, из которых адаптер построит собственный контейнер.
    Collection(ServiceCollection),
    /// Внешний резолвер; адаптер им не владеет.
    External(Arc<dyn ServiceProvider>),
}

/// Адаптер разрешения сервисов. Разделяется между потоками как
/// `Arc<ServiceProviderAdapter>`; все операции синхронные.
pub struct ServiceProviderAdapter {
    /// Резолвер, занимавший слот до установки этого адаптера.
    next: Option<Arc<dyn ServiceProvider>>,
    primary: OnceCell<Arc<dyn PrimaryProvider>>,
    source: Mutex<Option<ProviderSource>>,
    strategies: RwLock<HashMap<TypeId, ActivationStrategy>>,
    disposed: AtomicBool,
    stats: AdapterStats,
}

impl ServiceProviderAdapter {
    /// Адаптер поверх набора регистраций: контейнер будет построен при
    /// первом разрешении и остановлен в `stop()`.
    pub fn from_collection(
        collection: ServiceCollection,
        next: Option<Arc<dyn ServiceProvider>>,
    ) -> Self {
        Self::with_source(ProviderSource::Collection(collection), next)
    }

    /// Адаптер поверх готового внешнего резолвера. Его время жизни
    /// принадлежит вызывающему: `stop()` его не остановит.
    pub fn from_provider(
        existing: Arc<dyn ServiceProvider>,
        next: Option<Arc<dyn ServiceProvider>>,
    ) -> Self {
        Self::with_source(ProviderSource::External(existing), next)
    }

    fn with_source(source: ProviderSource, next: Option<Arc<dyn ServiceProvider>>) -> Self {
        Self {
            next,
            primary: OnceCell::new(),
            source: Mutex::new(Some(source)),
            strategies: RwLock::new(HashMap::new()),
            disposed: AtomicBool::new(false),
            stats: AdapterStats::default(),
        }
    }

    /// Первичный провайдер, строится ровно один раз. Гонка первых
    /// обращений разрешается `OnceCell`: проигравшие потоки блокируются
    /// до публикации и видят тот же экземпляр.
    fn primary(&self) -> &Arc<dyn PrimaryProvider> {
        self.primary.get_or_init(|| {
            let source = self
                .source
                .lock()
                .take()
                .expect("primary provider source is taken exactly once by the OnceCell initializer");
            match source {
                ProviderSource::Collection(collection) => {
                    debug!("building primary provider from service collection");
                    self.stats.record_container_build();
                    Arc::new(collection.build()) as Arc<dyn PrimaryProvider>
                }
                ProviderSource::External(existing) => {
                    debug!("adopting externally owned provider");
                    Arc::new(NonDisposableProvider::new(existing)) as Arc<dyn PrimaryProvider>
                }
            }
        })
    }

    fn check_not_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            self.stats.record_rejected();
            warn!("resolution attempted after {ADAPTER_NAME} was stopped");
            return Err(ResolveError::Disposed {
                adapter: ADAPTER_NAME,
            });
        }
        Ok(())
    }

    /// Стратегия активации для `T`: читается из кэша, на промахе
    /// вычисляется по blueprint'у вне блокировки. Гонка двух промахов
    /// допустима, выбор детерминирован и обе стороны запишут одно и то
    /// же значение.
    fn strategy_for<T: Activatable>(&self) -> ActivationStrategy {
        let type_id = TypeId::of::<T>();
        if let Some(strategy) = self.strategies.read().get(&type_id) {
            return *strategy;
        }

        let blueprint = T::blueprint();
        let strategy = activation::select_strategy(blueprint.is_visible(), &blueprint.metas());
        self.stats.record_strategy_selection();
        debug!(
            "selected {strategy:?} activation for {}",
            std::any::type_name::<T>()
        );
        *self.strategies.write().entry(type_id).or_insert(strategy)
    }

    /// Разрешить сервис типа `T` по трём уровням. Уровень прямого
    /// конструирования доступен только здесь: он требует `Activatable`,
    /// которого object-safe канал `get_raw` выразить не может.
    pub fn resolve<T: Activatable>(&self) -> Result<Arc<T>> {
        self.check_not_disposed()?;
        self.stats.record_resolution();

        if let Some(service) = self.primary().as_service_provider().get::<T>()? {
            self.stats.record_container_hit();
            return Ok(service);
        }

        if let Some(next) = &self.next {
            if let Some(service) = next.get::<T>()? {
                self.stats.record_fallback_hit();
                return Ok(service);
            }
        }

        // Параметры конструктора разрешаются только первичным
        // контейнером, не всей цепочкой уровней.
        let strategy = self.strategy_for::<T>();
        let constructed =
            activation::invoke::<T>(strategy, self.primary().as_service_provider())?;
        self.stats.record_activation();
        debug!("constructed {} directly", std::any::type_name::<T>());
        Ok(Arc::new(constructed))
    }

    /// Остановить адаптер. Контейнер, который адаптер построил сам,
    /// останавливается вместе с ним; не построенный — не форсируется.
    /// После остановки любой запрос возвращает `Disposed`. Идемпотентен.
    pub fn stop(&self) {
        if let Some(primary) = self.primary.get() {
            primary.dispose();
        }
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!("{ADAPTER_NAME} stopped");
        }
    }

    /// Снимок счётчиков адаптера.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl ServiceProvider for ServiceProviderAdapter {
    /// Object-safe разрешение: уровни контейнера и fallback. Используется,
    /// когда адаптер сам стоит в fallback-цепочке другого адаптера.
    fn get_raw(&self, type_id: TypeId) -> Result<Option<ErasedService>> {
        self.check_not_disposed()?;
        self.stats.record_resolution();

        if let Some(service) = self.primary().get_raw(type_id)? {
            self.stats.record_container_hit();
            return Ok(Some(service));
        }

        if let Some(next) = &self.next {
            if let Some(service) = next.get_raw(type_id)? {
                self.stats.record_fallback_hit();
                return Ok(Some(service));
            }
        }

        Ok(None)
    }
}

impl RegisteredObject for ServiceProviderAdapter {
    fn stop(&self, _immediate: bool) {
        ServiceProviderAdapter::stop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::{Constructor, TypeBlueprint};

    #[derive(Debug)]
    struct Widget {
        label: String,
    }

    impl Activatable for Widget {
        fn blueprint() -> TypeBlueprint<Self> {
            TypeBlueprint::visible().with(Constructor::public(0, |_| {
                Ok(Widget {
                    label: "constructed".to_string(),
                })
            }))
        }
    }

    #[test]
    fn container_registration_beats_direct_construction() {
        let mut services = ServiceCollection::new();
        services.add_value(Widget {
            label: "registered".to_string(),
        });
        let adapter = ServiceProviderAdapter::from_collection(services, None);

        let widget = adapter.resolve::<Widget>().expect("registered widget resolves");
        assert_eq!(widget.label, "registered");

        let snap = adapter.stats();
        assert_eq!(snap.container_hits, 1);
        assert_eq!(snap.activations, 0);
    }

    #[test]
    fn unknown_type_falls_through_to_construction() {
        let adapter = ServiceProviderAdapter::from_collection(ServiceCollection::new(), None);

        let widget = adapter.resolve::<Widget>().expect("widget self-constructs");
        assert_eq!(widget.label, "constructed");

        let snap = adapter.stats();
        assert_eq!(snap.container_hits, 0);
        assert_eq!(snap.activations, 1);
        assert_eq!(snap.strategy_selections, 1);
    }

    #[test]
    fn strategy_is_selected_once_per_type() {
        let adapter = ServiceProviderAdapter::from_collection(ServiceCollection::new(), None);

        adapter.resolve::<Widget>().expect("first construction");
        adapter.resolve::<Widget>().expect("second construction");

        let snap = adapter.stats();
        assert_eq!(snap.activations, 2);
        assert_eq!(snap.strategy_selections, 1);
    }

    #[test]
    fn stopped_adapter_rejects_every_request() {
        let adapter = ServiceProviderAdapter::from_collection(ServiceCollection::new(), None);
        adapter.stop();

        let err = adapter.resolve::<Widget>().expect_err("adapter is stopped");
        assert!(matches!(err, ResolveError::Disposed { .. }));
        assert_eq!(adapter.stats().rejected_after_dispose, 1);
    }

    #[test]
    fn stop_does_not_force_container_build() {
        let adapter = ServiceProviderAdapter::from_collection(ServiceCollection::new(), None);
        adapter.stop();
        assert!(adapter.primary.get().is_none());
        assert_eq!(adapter.stats().container_builds, 0);
    }
}
