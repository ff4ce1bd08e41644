//! Error handling для resolver adapter.
//!
//! Structured errors вместо .unwrap()/anyhow-строк: каждый сценарий отказа
//! имеет собственный вариант, чтобы вызывающий код мог отличить
//! "адаптер остановлен" от "зависимость не найдена".

use thiserror::Error;

/// Result alias для всех операций crate.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Ошибки разрешения сервисов.
///
/// Отсутствие сервиса в контейнере или fallback-провайдере НЕ является
/// ошибкой (это сигнал перейти к следующему tier) — поэтому здесь нет
/// варианта "not found in container". Ошибкой становится только
/// исчерпание всех tiers без жизнеспособной стратегии конструирования,
/// либо отказ самого конструирования.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Адаптер уже остановлен: любые дальнейшие resolve запрещены.
    /// Отличается от простого "не найдено".
    #[error("{adapter} has been disposed and can no longer resolve services")]
    Disposed { adapter: &'static str },

    /// Обязательный параметр конструктора не удалось разрешить через
    /// цепочку провайдеров. Пробрасывается без модификаций.
    #[error("unable to resolve required dependency '{service_type}'")]
    UnresolvedDependency { service_type: String },

    /// Direct instantiation не нашла parameterless конструктор.
    /// Фатальная ошибка конструирования, не "пустой" результат.
    #[error("no viable parameterless constructor for '{service_type}'")]
    NoViableConstructor { service_type: String },

    /// Зарегистрированная фабрика завершилась с ошибкой предметной области.
    #[error("service factory for '{service_type}' failed")]
    FactoryFailed {
        service_type: String,
        #[source]
        source: anyhow::Error,
    },

    /// Запись в реестре не соответствует запрошенному типу.
    /// Указывает на баг регистрации, не замалчивается.
    #[error("registered entry for '{service_type}' does not match the requested type")]
    TypeMismatch { service_type: String },

    /// Ambient accessor вызван вне активного host-контекста.
    #[error("no ambient host context is active while resolving '{service_type}'")]
    NoAmbientContext { service_type: &'static str },
}

impl ResolveError {
    /// Обернуть ошибку предметной области, возникшую внутри фабрики сервиса.
    pub fn factory<E>(service_type: &str, source: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::FactoryFailed {
            service_type: service_type.to_string(),
            source: source.into(),
        }
    }

    /// Ошибка "зависимость не разрешена" для типа `I`.
    pub fn unresolved<I: ?Sized>() -> Self {
        Self::UnresolvedDependency {
            service_type: std::any::type_name::<I>().to_string(),
        }
    }
}
