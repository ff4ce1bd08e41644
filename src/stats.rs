//! Счётчики работы адаптера.
//!
//! Lock-free статистика на атомиках, по образцу остальных метрик
//! подсистемы: запись — `fetch_add(Relaxed)`, чтение — мгновенный snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Счётчики разрешения сервисов. Все операции lock-free.
#[derive(Debug, Default)]
pub struct AdapterStats {
    total_resolutions: AtomicU64,
    container_hits: AtomicU64,
    fallback_hits: AtomicU64,
    activations: AtomicU64,
    strategy_selections: AtomicU64,
    rejected_after_dispose: AtomicU64,
    container_builds: AtomicU64,
}

impl AdapterStats {
    pub(crate) fn record_resolution(&self) {
        self.total_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_container_hit(&self) {
        self.container_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback_hit(&self) {
        self.fallback_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_activation(&self) {
        self.activations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_strategy_selection(&self) {
        self.strategy_selections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected_after_dispose.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_container_build(&self) {
        self.container_builds.fetch_add(1, Ordering::Relaxed);
    }

    /// Мгновенный снимок счётчиков.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_resolutions: self.total_resolutions.load(Ordering::Relaxed),
            container_hits: self.container_hits.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            activations: self.activations.load(Ordering::Relaxed),
            strategy_selections: self.strategy_selections.load(Ordering::Relaxed),
            rejected_after_dispose: self.rejected_after_dispose.load(Ordering::Relaxed),
            container_builds: self.container_builds.load(Ordering::Relaxed),
        }
    }
}

/// Снимок счётчиков адаптера на момент вызова.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Всего запросов разрешения (включая отклонённые).
    pub total_resolutions: u64,
    /// Разрешено первичным контейнером (tier 1).
    pub container_hits: u64,
    /// Разрешено fallback-резолвером (tier 2).
    pub fallback_hits: u64,
    /// Сконструировано напрямую (tier 3).
    pub activations: u64,
    /// Холодных выборов стратегии (промахи кэша стратегий).
    pub strategy_selections: u64,
    /// Запросов после остановки адаптера.
    pub rejected_after_dispose: u64,
    /// Построений первичного контейнера (по контракту — не больше одного).
    pub container_builds: u64,
}

impl StatsSnapshot {
    /// Доля запросов, закрытых первичным контейнером.
    pub fn container_hit_rate(&self) -> f64 {
        if self.total_resolutions == 0 {
            0.0
        } else {
            self.container_hits as f64 / self.total_resolutions as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let stats = AdapterStats::default();
        stats.record_resolution();
        stats.record_resolution();
        stats.record_container_hit();
        stats.record_activation();
        stats.record_strategy_selection();

        let snap = stats.snapshot();
        assert_eq!(snap.total_resolutions, 2);
        assert_eq!(snap.container_hits, 1);
        assert_eq!(snap.fallback_hits, 0);
        assert_eq!(snap.activations, 1);
        assert_eq!(snap.strategy_selections, 1);
        assert_eq!(snap.rejected_after_dispose, 0);
    }

    #[test]
    fn hit_rate_handles_zero_resolutions() {
        let stats = AdapterStats::default();
        assert_eq!(stats.snapshot().container_hit_rate(), 0.0);

        stats.record_resolution();
        stats.record_resolution();
        stats.record_container_hit();
        assert!((stats.snapshot().container_hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
