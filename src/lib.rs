//! Адаптер разрешения сервисов для хостов с обменным слотом активатора.
//!
//! Хост создаёт свои объекты через единственный слот-резолвер; этот crate
//! ставит в слот `ServiceProviderAdapter`, который ищет сервис по трём
//! уровням: собственный контейнер, вытесненный предыдущий резолвер,
//! прямое конструирование типа. Контейнер строится лениво ровно один
//! раз; выбранная стратегия конструирования кэшируется per-type.
//!
//! Точки входа:
//! - [`ServiceCollection`] — регистрация сервисов;
//! - [`ServiceProviderAdapter`] — трёхуровневое разрешение;
//! - [`host::install`] — установка адаптера в слот хоста с
//!   ambient-аксессорами и подпиской на остановку.

pub mod activation;
pub mod adapter;
pub mod collection;
pub mod errors;
pub mod host;
pub mod provider;
pub mod stats;

pub use activation::{
    Activatable, ActivationStrategy, Constructor, ConstructorChooser, ConstructorMeta,
    MarkedFirst, TypeBlueprint, WidestPublic,
};
pub use adapter::ServiceProviderAdapter;
pub use collection::ServiceCollection;
pub use errors::{ResolveError, Result};
pub use host::{
    install, ActivatorSlot, AmbientContext, HostContext, HostRequest, HostResponse, HostSession,
    RegisteredObject, ShutdownRegistry,
};
pub use provider::{erase, recover, ErasedService, ServiceProvider, ServiceProviderExt};
pub use stats::{AdapterStats, StatsSnapshot};
