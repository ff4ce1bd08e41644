//! Интеграция адаптера в хостовую среду.
//!
//! Хост держит обменный слот активатора (`ActivatorSlot`) и реестр
//! объектов, желающих получать сигнал остановки (`ShutdownRegistry`).
//! `install()` связывает всё вместе: регистрирует ambient-аксессоры,
//! ставит адаптер в слот, а предыдущего жильца слота делает его
//! fallback-резолвером — так несколько установок образуют цепочку.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::adapter::ServiceProviderAdapter;
use crate::collection::ServiceCollection;
use crate::errors::ResolveError;
use crate::provider::ServiceProvider;

/// Объект, которому хост сообщает об остановке.
pub trait RegisteredObject: Send + Sync {
    /// `immediate` — хост требует немедленной остановки, без
    /// отложенного завершения.
    fn stop(&self, immediate: bool);
}

/// Реестр объектов, уведомляемых при остановке хоста.
#[derive(Default)]
pub struct ShutdownRegistry {
    objects: Mutex<Vec<Arc<dyn RegisteredObject>>>,
    stopped: std::sync::atomic::AtomicBool,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Зарегистрировать объект. После `notify_stop` регистрация
    /// бессмысленна и игнорируется.
    pub fn register(&self, object: Arc<dyn RegisteredObject>) {
        if self.stopped.load(std::sync::atomic::Ordering::SeqCst) {
            warn!("registration after shutdown ignored");
            return;
        }
        self.objects.lock().push(object);
    }

    /// Разослать сигнал остановки всем зарегистрированным объектам,
    /// в порядке регистрации. Повторный вызов — no-op.
    pub fn notify_stop(&self) {
        if self.stopped.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let objects: Vec<_> = self.objects.lock().drain(..).collect();
        debug!("notifying {} registered objects of shutdown", objects.len());
        for object in objects {
            object.stop(true);
        }
    }
}

/// Слот активатора хоста: текущий резолвер, через который хост создаёт
/// свои объекты. Замена возвращает предыдущего жильца.
#[derive(Default)]
pub struct ActivatorSlot {
    current: RwLock<Option<Arc<dyn ServiceProvider>>>,
}

impl ActivatorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Текущий жилец слота.
    pub fn current(&self) -> Option<Arc<dyn ServiceProvider>> {
        self.current.read().clone()
    }

    /// Поставить нового жильца, вернуть предыдущего.
    pub fn swap(
        &self,
        replacement: Arc<dyn ServiceProvider>,
    ) -> Option<Arc<dyn ServiceProvider>> {
        self.current.write().replace(replacement)
    }
}

/// Текущий запрос хоста.
#[derive(Debug)]
pub struct HostRequest {
    pub url: String,
    pub method: String,
}

/// Ответ на текущий запрос.
#[derive(Debug)]
pub struct HostResponse {
    pub status: u16,
}

/// Сессия текущего запроса.
#[derive(Debug)]
pub struct HostSession {
    pub id: String,
}

/// Контекст обработки одного запроса: приложение плюс объекты запроса.
pub struct HostContext<A> {
    pub application: Arc<A>,
    pub request: Arc<HostRequest>,
    pub response: Arc<HostResponse>,
    pub session: Arc<HostSession>,
}

impl<A> Clone for HostContext<A> {
    fn clone(&self) -> Self {
        Self {
            application: Arc::clone(&self.application),
            request: Arc::clone(&self.request),
            response: Arc::clone(&self.response),
            session: Arc::clone(&self.session),
        }
    }
}

/// Ambient-держатель контекста текущего запроса. Хост вызывает
/// `enter`/`exit` вокруг обработки; ambient-аксессоры читают `current`.
pub struct AmbientContext<A> {
    active: RwLock<Option<HostContext<A>>>,
}

impl<A> Default for AmbientContext<A> {
    fn default() -> Self {
        Self {
            active: RwLock::new(None),
        }
    }
}

impl<A> AmbientContext<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Активировать контекст на время обработки запроса.
    pub fn enter(&self, context: HostContext<A>) {
        *self.active.write() = Some(context);
    }

    /// Деактивировать контекст после обработки.
    pub fn exit(&self) {
        *self.active.write() = None;
    }

    /// Текущий активный контекст, если обработка запроса идёт.
    pub fn current(&self) -> Option<HostContext<A>> {
        self.active.read().clone()
    }
}

fn ambient_error<A>() -> ResolveError {
    ResolveError::NoAmbientContext {
        service_type: std::any::type_name::<A>(),
    }
}

/// Установить адаптер в хост: зарегистрировать ambient-аксессоры,
/// подписаться на остановку и занять слот активатора. Предыдущий жилец
/// слота становится fallback-резолвером нового адаптера.
pub fn install<A: Send + Sync + 'static>(
    slot: &ActivatorSlot,
    shutdown: &ShutdownRegistry,
    ambient: &Arc<AmbientContext<A>>,
    mut collection: ServiceCollection,
) -> Arc<ServiceProviderAdapter> {
    {
        let ambient = Arc::clone(ambient);
        collection.add_transient::<A, _>(move |_| {
            ambient
                .current()
                .map(|context| context.application)
                .ok_or_else(ambient_error::<A>)
        });
    }
    {
        let ambient = Arc::clone(ambient);
        collection.add_transient::<HostRequest, _>(move |_| {
            ambient
                .current()
                .map(|context| context.request)
                .ok_or_else(ambient_error::<HostRequest>)
        });
    }
    {
        let ambient = Arc::clone(ambient);
        collection.add_transient::<HostResponse, _>(move |_| {
            ambient
                .current()
                .map(|context| context.response)
                .ok_or_else(ambient_error::<HostResponse>)
        });
    }
    {
        let ambient = Arc::clone(ambient);
        collection.add_transient::<HostSession, _>(move |_| {
            ambient
                .current()
                .map(|context| context.session)
                .ok_or_else(ambient_error::<HostSession>)
        });
    }

    let next = slot.current();
    let adapter = Arc::new(ServiceProviderAdapter::from_collection(collection, next));
    shutdown.register(adapter.clone());
    slot.swap(adapter.clone());
    debug!("adapter installed into activator slot");
    adapter
}
