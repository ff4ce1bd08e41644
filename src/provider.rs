//! Object-safe шов разрешения сервисов.
//!
//! Решение проблемы dyn-compatibility: generic `get::<I>()` не может жить
//! в object-safe trait, поэтому интерфейс разделён на два уровня:
//! - `ServiceProvider` — type-erased поверхность по `TypeId`, пригодная
//!   для `Arc<dyn ServiceProvider>` и построения fallback-цепочек;
//! - `ServiceProviderExt` — типобезопасная обёртка с downcast поверх неё.
//!
//! Erased-представление всегда содержит `Arc<I>` (а не `I` напрямую),
//! поэтому trait-объектные сервисы (`I = dyn Trait`) проходят через тот же
//! канал, что и конкретные типы.

use std::any::{Any, TypeId};
use std::sync::Arc;

use tracing::warn;

use crate::errors::{ResolveError, Result};

/// Type-erased сервис. Конкретный тип внутри — всегда `Arc<I>`.
pub type ErasedService = Arc<dyn Any + Send + Sync>;

/// Упаковать сервис в erased-представление.
pub fn erase<I>(service: Arc<I>) -> ErasedService
where
    I: ?Sized + Send + Sync + 'static,
{
    Arc::new(service)
}

/// Распаковать erased-представление обратно в `Arc<I>`.
///
/// `None` означает расхождение типов (запись была создана под другой `I`).
pub fn recover<I>(erased: ErasedService) -> Option<Arc<I>>
where
    I: ?Sized + Send + Sync + 'static,
{
    erased
        .downcast::<Arc<I>>()
        .ok()
        .map(|wrapped| Arc::clone(wrapped.as_ref()))
}

/// Поставщик сервисов по типу.
///
/// Контракт: `Ok(None)` — тип неизвестен провайдеру (это НЕ ошибка,
/// вызывающий переходит к следующему tier); `Err` — сбой самого
/// провайдера (отказ фабрики, остановленный адаптер).
pub trait ServiceProvider: Send + Sync {
    /// Вернуть сервис для `type_id`, либо `None`, если тип неизвестен.
    fn get_raw(&self, type_id: TypeId) -> Result<Option<ErasedService>>;
}

/// Типобезопасные операции поверх object-safe провайдера.
pub trait ServiceProviderExt: ServiceProvider {
    /// Разрешить сервис типа `I`, `None` если провайдер его не знает.
    fn get<I>(&self) -> Result<Option<Arc<I>>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        match self.get_raw(TypeId::of::<I>())? {
            Some(erased) => match recover::<I>(erased) {
                Some(service) => Ok(Some(service)),
                None => {
                    let service_type = std::any::type_name::<I>();
                    warn!("type mismatch in registry entry for {service_type}");
                    Err(ResolveError::TypeMismatch {
                        service_type: service_type.to_string(),
                    })
                }
            },
            None => Ok(None),
        }
    }

    /// Разрешить обязательную зависимость: отсутствие типа — ошибка.
    ///
    /// Используется build-замыканиями конструкторов для параметров;
    /// сбой пробрасывается вызывающему без модификаций.
    fn get_required<I>(&self) -> Result<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.get::<I>()?.ok_or_else(ResolveError::unresolved::<I>)
    }
}

impl<P: ServiceProvider + ?Sized> ServiceProviderExt for P {}
