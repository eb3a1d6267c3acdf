//! Stats service - admin dashboard numbers

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::{format_timestamp, unlocks, users, RecentUnlock, TrackerDb};
use crate::types::TrackerError;

/// Rows in the dashboard's recent-activity feed
pub const RECENT_UNLOCKS_SHOWN: u32 = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_unlocks: u64,
    /// Distinct users with an unlock in the last 7 days
    pub active_this_week: u64,
    /// Unlocks in the last 24 hours
    pub recent_activity: u64,
    /// Average unlocked steps per user, rounded
    pub avg_progress: u64,
    pub recent_unlocks: Vec<RecentUnlock>,
}

pub struct StatsService {
    db: Arc<TrackerDb>,
}

impl StatsService {
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self { db }
    }

    pub fn dashboard(&self, now: DateTime<Utc>) -> Result<DashboardStats, TrackerError> {
        let week_ago = format_timestamp(now - Duration::days(7));
        let day_ago = format_timestamp(now - Duration::hours(24));

        self.db.with_conn(|conn| {
            let total_users = users::count_users(conn)?;
            let total_unlocks = unlocks::count_unlocks(conn)?;
            let avg_progress = if total_users == 0 {
                0
            } else {
                (total_unlocks as f64 / total_users as f64).round() as u64
            };

            Ok(DashboardStats {
                total_users,
                total_unlocks,
                active_this_week: unlocks::count_active_users_since(conn, &week_ago)?,
                recent_activity: unlocks::count_unlocks_since(conn, &day_ago)?,
                avg_progress,
                recent_unlocks: unlocks::recent_unlocks(conn, RECENT_UNLOCKS_SHOWN)?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{seed_tree, seed_user};
    use crate::services::ProgressService;

    #[test]
    fn test_empty_dashboard() {
        let stats = StatsService::new(Arc::new(TrackerDb::open_in_memory().unwrap()));
        let dashboard = stats.dashboard(Utc::now()).unwrap();
        assert_eq!(dashboard.total_users, 0);
        assert_eq!(dashboard.avg_progress, 0);
        assert!(dashboard.recent_unlocks.is_empty());
    }

    #[test]
    fn test_dashboard_counts() {
        let db = Arc::new(TrackerDb::open_in_memory().unwrap());
        seed_tree(&db);
        let a = seed_user(&db, "a@example.com");
        seed_user(&db, "b@example.com");
        let progress = ProgressService::new(db.clone());
        progress.ensure_basic_unlocks(&a).unwrap();
        progress.unlock_all(&a).unwrap();

        let stats = StatsService::new(db);
        let dashboard = stats.dashboard(Utc::now()).unwrap();
        assert_eq!(dashboard.total_users, 2);
        assert_eq!(dashboard.total_unlocks, 7);
        assert_eq!(dashboard.active_this_week, 1);
        assert_eq!(dashboard.recent_activity, 7);
        // 7 / 2 = 3.5 rounds up
        assert_eq!(dashboard.avg_progress, 4);
        assert_eq!(dashboard.recent_unlocks.len(), RECENT_UNLOCKS_SHOWN as usize);

        // A week later nothing is recent
        let later = stats.dashboard(Utc::now() + Duration::days(8)).unwrap();
        assert_eq!(later.active_this_week, 0);
        assert_eq!(later.recent_activity, 0);
    }
}
