//! Прямое конструирование сервисов, незнакомых контейнеру.
//!
//! Тип публикует `TypeBlueprint` — видимость плюс набор конструкторов с
//! метаданными и build-замыканиями. По blueprint'у один раз выбирается
//! `ActivationStrategy`, дальше активация идёт по закэшированному тегу:
//! - `Standard` — конструктор выбирает политика (`ConstructorChooser`),
//!   параметры разрешаются через провайдер;
//! - `Direct` — тип скрыт или без публичных конструкторов, берётся
//!   беспараметрический конструктор любой видимости.

use crate::errors::{ResolveError, Result};
use crate::provider::ServiceProvider;

/// Метаданные конструктора: пометка, видимость, число параметров.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstructorMeta {
    /// Конструктор явно помечен как предпочитаемый для активации.
    pub marked: bool,
    /// Конструктор публичный.
    pub public: bool,
    /// Число параметров.
    pub arity: usize,
}

/// Build-замыкание конструктора.
type BuildFn<T> = Box<dyn Fn(&dyn ServiceProvider) -> Result<T> + Send + Sync>;

/// Конструктор типа `T`: метаданные плюс build-замыкание, разрешающее
/// параметры через переданный провайдер.
pub struct Constructor<T> {
    meta: ConstructorMeta,
    build: BuildFn<T>,
}

impl<T> Constructor<T> {
    /// Публичный конструктор.
    pub fn public<F>(arity: usize, build: F) -> Self
    where
        F: Fn(&dyn ServiceProvider) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            meta: ConstructorMeta {
                marked: false,
                public: true,
                arity,
            },
            build: Box::new(build),
        }
    }

    /// Публичный конструктор, помеченный как предпочитаемый.
    pub fn marked<F>(arity: usize, build: F) -> Self
    where
        F: Fn(&dyn ServiceProvider) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            meta: ConstructorMeta {
                marked: true,
                public: true,
                arity,
            },
            build: Box::new(build),
        }
    }

    /// Непубличный конструктор.
    pub fn non_public<F>(arity: usize, build: F) -> Self
    where
        F: Fn(&dyn ServiceProvider) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            meta: ConstructorMeta {
                marked: false,
                public: false,
                arity,
            },
            build: Box::new(build),
        }
    }

    pub fn meta(&self) -> ConstructorMeta {
        self.meta
    }

    pub fn invoke(&self, provider: &dyn ServiceProvider) -> Result<T> {
        (self.build)(provider)
    }
}

/// Описание типа для активации: видимость плюс конструкторы в порядке
/// объявления.
pub struct TypeBlueprint<T> {
    visible: bool,
    constructors: Vec<Constructor<T>>,
}

impl<T> TypeBlueprint<T> {
    /// Видимый тип без конструкторов (дополняется через `with`).
    pub fn visible() -> Self {
        Self {
            visible: true,
            constructors: Vec::new(),
        }
    }

    /// Скрытый тип: активация всегда идёт по `Direct`-пути.
    pub fn hidden() -> Self {
        Self {
            visible: false,
            constructors: Vec::new(),
        }
    }

    /// Тип без знания о конструировании: любая попытка активации
    /// завершается `NoViableConstructor`.
    pub fn opaque() -> Self {
        Self::hidden()
    }

    pub fn with(mut self, constructor: Constructor<T>) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn constructors(&self) -> &[Constructor<T>] {
        &self.constructors
    }

    pub fn metas(&self) -> Vec<ConstructorMeta> {
        self.constructors.iter().map(Constructor::meta).collect()
    }
}

/// Тип, умеющий описать себя для прямой активации.
pub trait Activatable: Send + Sync + Sized + 'static {
    fn blueprint() -> TypeBlueprint<Self>;
}

/// Выбранный для типа способ активации. Кэшируется на адаптере.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStrategy {
    /// Конструктор выбирает политика, параметры разрешает провайдер.
    Standard,
    /// Беспараметрический конструктор любой видимости.
    Direct,
}

/// Чистый выбор стратегии по видимости и метаданным конструкторов.
pub fn select_strategy(visible: bool, metas: &[ConstructorMeta]) -> ActivationStrategy {
    if visible && metas.iter().any(|meta| meta.public) {
        ActivationStrategy::Standard
    } else {
        ActivationStrategy::Direct
    }
}

/// Политика выбора конструктора среди публичных кандидатов.
pub trait ConstructorChooser: Send + Sync {
    /// Индекс выбранного конструктора в `metas`, либо `None`, если ни
    /// один не подходит.
    fn choose(&self, metas: &[ConstructorMeta]) -> Option<usize>;
}

/// Ровно один помеченный конструктор выигрывает безусловно; иначе —
/// делегирование `WidestPublic`. Несколько помеченных не дают
/// детерминированного предпочтения и игнорируются.
pub struct MarkedFirst;

impl ConstructorChooser for MarkedFirst {
    fn choose(&self, metas: &[ConstructorMeta]) -> Option<usize> {
        let mut marked = metas
            .iter()
            .enumerate()
            .filter(|(_, meta)| meta.marked && meta.public);
        match (marked.next(), marked.next()) {
            (Some((index, _)), None) => Some(index),
            _ => WidestPublic.choose(metas),
        }
    }
}

/// Публичный конструктор с наибольшим числом параметров; при равенстве
/// выигрывает объявленный раньше.
pub struct WidestPublic;

impl ConstructorChooser for WidestPublic {
    fn choose(&self, metas: &[ConstructorMeta]) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (index, meta) in metas.iter().enumerate() {
            if !meta.public {
                continue;
            }
            match best {
                Some((_, best_arity)) if meta.arity <= best_arity => {}
                _ => best = Some((index, meta.arity)),
            }
        }
        best.map(|(index, _)| index)
    }
}

/// Активировать `T` по уже выбранной стратегии.
pub fn invoke<T: Activatable>(
    strategy: ActivationStrategy,
    provider: &dyn ServiceProvider,
) -> Result<T> {
    let blueprint = T::blueprint();
    let constructor = match strategy {
        ActivationStrategy::Standard => {
            let metas = blueprint.metas();
            MarkedFirst
                .choose(&metas)
                .map(|index| &blueprint.constructors()[index])
        }
        ActivationStrategy::Direct => blueprint
            .constructors()
            .iter()
            .find(|constructor| constructor.meta().arity == 0),
    };

    match constructor {
        Some(constructor) => constructor.invoke(provider),
        None => Err(ResolveError::NoViableConstructor {
            service_type: std::any::type_name::<T>().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn meta(marked: bool, public: bool, arity: usize) -> ConstructorMeta {
        ConstructorMeta {
            marked,
            public,
            arity,
        }
    }

    #[rstest]
    #[case::visible_with_public(true, vec![meta(false, true, 2)], ActivationStrategy::Standard)]
    #[case::hidden_type(false, vec![meta(false, true, 2)], ActivationStrategy::Direct)]
    #[case::only_non_public(true, vec![meta(false, false, 0)], ActivationStrategy::Direct)]
    #[case::no_constructors(true, vec![], ActivationStrategy::Direct)]
    fn strategy_selection(
        #[case] visible: bool,
        #[case] metas: Vec<ConstructorMeta>,
        #[case] expected: ActivationStrategy,
    ) {
        assert_eq!(select_strategy(visible, &metas), expected);
    }

    #[test]
    fn single_marked_constructor_wins_over_wider_one() {
        let metas = vec![meta(false, true, 3), meta(true, true, 1)];
        assert_eq!(MarkedFirst.choose(&metas), Some(1));
    }

    #[test]
    fn multiple_marked_constructors_fall_back_to_widest() {
        let metas = vec![meta(true, true, 1), meta(true, true, 0), meta(false, true, 4)];
        assert_eq!(MarkedFirst.choose(&metas), Some(2));
    }

    #[test]
    fn widest_public_prefers_first_on_arity_tie() {
        let metas = vec![meta(false, true, 2), meta(false, true, 2)];
        assert_eq!(WidestPublic.choose(&metas), Some(0));
    }

    #[test]
    fn widest_public_skips_non_public_candidates() {
        let metas = vec![meta(false, false, 5), meta(false, true, 1)];
        assert_eq!(WidestPublic.choose(&metas), Some(1));
    }

    #[test]
    fn no_public_candidates_yields_none() {
        let metas = vec![meta(false, false, 0)];
        assert_eq!(WidestPublic.choose(&metas), None);
        assert_eq!(MarkedFirst.choose(&metas), None);
    }

    #[derive(Debug)]
    struct Bare;

    impl Activatable for Bare {
        fn blueprint() -> TypeBlueprint<Self> {
            TypeBlueprint::hidden().with(Constructor::non_public(0, |_| Ok(Bare)))
        }
    }

    #[derive(Debug)]
    struct NeedsInput;

    impl Activatable for NeedsInput {
        fn blueprint() -> TypeBlueprint<Self> {
            TypeBlueprint::visible().with(Constructor::public(1, |_| {
                Err(ResolveError::UnresolvedDependency {
                    service_type: "input".to_string(),
                })
            }))
        }
    }

    struct NullProvider;

    impl ServiceProvider for NullProvider {
        fn get_raw(
            &self,
            _type_id: std::any::TypeId,
        ) -> Result<Option<crate::provider::ErasedService>> {
            Ok(None)
        }
    }

    #[derive(Debug)]
    struct Opaque;

    impl Activatable for Opaque {
        fn blueprint() -> TypeBlueprint<Self> {
            TypeBlueprint::opaque()
        }
    }

    #[test]
    fn opaque_type_cannot_be_activated() {
        let strategy = select_strategy(false, &Opaque::blueprint().metas());
        let err = invoke::<Opaque>(strategy, &NullProvider)
            .expect_err("opaque blueprint has nothing to invoke");
        assert!(matches!(err, ResolveError::NoViableConstructor { .. }));
    }

    #[test]
    fn direct_strategy_uses_parameterless_constructor() {
        invoke::<Bare>(ActivationStrategy::Direct, &NullProvider)
            .expect("hidden type builds through its parameterless constructor");
    }

    #[test]
    fn direct_strategy_without_parameterless_constructor_fails() {
        let err = invoke::<NeedsInput>(ActivationStrategy::Direct, &NullProvider)
            .expect_err("no parameterless constructor available");
        assert!(matches!(err, ResolveError::NoViableConstructor { .. }));
    }

    #[test]
    fn standard_strategy_propagates_constructor_failure() {
        let err = invoke::<NeedsInput>(ActivationStrategy::Standard, &NullProvider)
            .expect_err("constructor cannot resolve its parameter");
        assert!(matches!(err, ResolveError::UnresolvedDependency { .. }));
    }
}
