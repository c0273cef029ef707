/// Profile view analytics
///
/// The real collector lives in another service; the session only reads from
/// it. [`InMemoryViewAnalytics`] implements the same contract locally so the
/// dedup window and trend rules can be exercised without that service.
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Repeat views from the same viewer inside this window count once
pub const DEDUP_WINDOW_MINUTES: i64 = 5;
pub const RECENT_VIEWERS_LIMIT: usize = 10;
/// Week-over-week change (in percent) needed to call a trend up or down
pub const TREND_THRESHOLD_PERCENT: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerType {
    Applicant,
    Employer,
    Anonymous,
}

/// A single incoming view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewEvent {
    pub subject_id: String,
    pub viewer_id: Option<String>,
    pub viewer_type: ViewerType,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl ViewEvent {
    /// Logged-in viewers are keyed by id, anonymous ones by address
    pub fn effective_viewer_id(&self) -> String {
        match &self.viewer_id {
            Some(id) => id.clone(),
            None => format!(
                "anonymous:{}",
                self.ip_address.as_deref().unwrap_or("unknown")
            ),
        }
    }

    fn is_self_view(&self) -> bool {
        self.viewer_id.as_deref() == Some(self.subject_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecord {
    pub viewer_id: String,
    pub viewer_type: ViewerType,
    pub user_agent: Option<String>,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewTrend {
    pub percentage: i64,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyViews {
    pub date: NaiveDate,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewStats {
    pub total: u64,
    pub today: u64,
    pub this_week: u64,
    pub this_month: u64,
    pub trend: ViewTrend,
    /// Last 7 UTC dates, oldest first, zero days included
    pub daily: Vec<DailyViews>,
    /// Most recent first
    pub recent_viewers: Vec<ViewRecord>,
}

#[async_trait]
pub trait ViewAnalyticsCollector: Send + Sync {
    /// Returns whether the view was counted
    async fn record_view(&self, event: ViewEvent) -> Result<bool>;

    async fn get_stats(&self, subject_id: &str) -> Result<ViewStats>;
}

/// Week-over-week trend
pub fn compute_trend(current_week: u64, previous_week: u64) -> ViewTrend {
    let change = if previous_week == 0 {
        if current_week > 0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current_week as f64 - previous_week as f64) * 100.0 / previous_week as f64
    };

    // Direction from the exact change, only the reported figure is rounded
    let threshold = TREND_THRESHOLD_PERCENT as f64;
    let direction = if change > threshold {
        TrendDirection::Up
    } else if change < -threshold {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    };

    ViewTrend {
        percentage: change.round() as i64,
        direction,
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct InMemoryViewAnalytics {
    views: RwLock<HashMap<String, Vec<ViewRecord>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryViewAnalytics {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for InMemoryViewAnalytics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ViewAnalyticsCollector for InMemoryViewAnalytics {
    async fn record_view(&self, event: ViewEvent) -> Result<bool> {
        if event.is_self_view() {
            return Ok(false);
        }

        let now = self.clock.now();
        let viewer_id = event.effective_viewer_id();
        let window_start = now - Duration::minutes(DEDUP_WINDOW_MINUTES);

        let mut views = self.views.write().await;
        let records = views.entry(event.subject_id).or_default();

        let duplicate = records
            .iter()
            .any(|r| r.viewer_id == viewer_id && r.viewed_at > window_start);
        if duplicate {
            return Ok(false);
        }

        records.push(ViewRecord {
            viewer_id,
            viewer_type: event.viewer_type,
            user_agent: event.user_agent,
            viewed_at: now,
        });
        Ok(true)
    }

    async fn get_stats(&self, subject_id: &str) -> Result<ViewStats> {
        let now = self.clock.now();
        let views = self.views.read().await;
        let records: &[ViewRecord] = views.get(subject_id).map(Vec::as_slice).unwrap_or(&[]);

        let count_since =
            |since: DateTime<Utc>| records.iter().filter(|r| r.viewed_at > since).count() as u64;

        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now);
        let week_ago = now - Duration::days(7);
        let two_weeks_ago = now - Duration::days(14);

        let this_week = count_since(week_ago);
        let previous_week = records
            .iter()
            .filter(|r| r.viewed_at > two_weeks_ago && r.viewed_at <= week_ago)
            .count() as u64;

        let daily = (0..7)
            .rev()
            .map(|days_back| {
                let date = (now - Duration::days(days_back)).date_naive();
                let views = records
                    .iter()
                    .filter(|r| r.viewed_at.date_naive() == date)
                    .count() as u64;
                DailyViews { date, views }
            })
            .collect();

        let mut recent_viewers = records.to_vec();
        recent_viewers.sort_by(|a, b| b.viewed_at.cmp(&a.viewed_at));
        recent_viewers.truncate(RECENT_VIEWERS_LIMIT);

        Ok(ViewStats {
            total: records.len() as u64,
            today: records.iter().filter(|r| r.viewed_at >= today_start).count() as u64,
            this_week,
            this_month: count_since(now - Duration::days(30)),
            trend: compute_trend(this_week, previous_week),
            daily,
            recent_viewers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(now)))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn view(subject: &str, viewer: Option<&str>) -> ViewEvent {
        ViewEvent {
            subject_id: subject.to_string(),
            viewer_id: viewer.map(str::to_string),
            viewer_type: if viewer.is_some() {
                ViewerType::Employer
            } else {
                ViewerType::Anonymous
            },
            user_agent: Some("Mozilla/5.0".to_string()),
            ip_address: Some("203.0.113.7".to_string()),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_trend_rules() {
        assert_eq!(
            compute_trend(3, 0),
            ViewTrend { percentage: 100, direction: TrendDirection::Up }
        );
        assert_eq!(
            compute_trend(9, 10),
            ViewTrend { percentage: -10, direction: TrendDirection::Down }
        );
        assert_eq!(
            compute_trend(10, 10),
            ViewTrend { percentage: 0, direction: TrendDirection::Stable }
        );
        assert_eq!(compute_trend(0, 0).direction, TrendDirection::Stable);
        assert_eq!(compute_trend(21, 20).direction, TrendDirection::Stable);
    }

    #[test]
    fn test_trend_direction_uses_unrounded_change() {
        // +5.26%, -5.0% and -5.3% all round to a magnitude of 5
        assert_eq!(
            compute_trend(100, 95),
            ViewTrend { percentage: 5, direction: TrendDirection::Up }
        );
        assert_eq!(
            compute_trend(95, 100),
            ViewTrend { percentage: -5, direction: TrendDirection::Stable }
        );
        assert_eq!(
            compute_trend(947, 1000),
            ViewTrend { percentage: -5, direction: TrendDirection::Down }
        );
    }

    #[tokio::test]
    async fn test_repeat_view_inside_window_counts_once() {
        let clock = ManualClock::at(noon());
        let analytics = InMemoryViewAnalytics::with_clock(clock.clone());

        assert!(analytics.record_view(view("alice", Some("acme"))).await.unwrap());
        clock.advance(Duration::minutes(4));
        assert!(!analytics.record_view(view("alice", Some("acme"))).await.unwrap());

        assert_eq!(analytics.get_stats("alice").await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_view_after_window_counts_again() {
        let clock = ManualClock::at(noon());
        let analytics = InMemoryViewAnalytics::with_clock(clock.clone());

        analytics.record_view(view("alice", Some("acme"))).await.unwrap();
        clock.advance(Duration::minutes(6));
        assert!(analytics.record_view(view("alice", Some("acme"))).await.unwrap());
        assert_eq!(analytics.get_stats("alice").await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_self_view_is_ignored() {
        let analytics = InMemoryViewAnalytics::with_clock(ManualClock::at(noon()));
        assert!(!analytics.record_view(view("alice", Some("alice"))).await.unwrap());
        assert_eq!(analytics.get_stats("alice").await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_anonymous_viewers_keyed_by_address() {
        let analytics = InMemoryViewAnalytics::with_clock(ManualClock::at(noon()));

        assert!(analytics.record_view(view("alice", None)).await.unwrap());
        assert!(!analytics.record_view(view("alice", None)).await.unwrap());

        let mut other = view("alice", None);
        other.ip_address = Some("198.51.100.1".to_string());
        assert!(analytics.record_view(other).await.unwrap());
    }

    #[tokio::test]
    async fn test_stats_windows_and_trend() {
        let clock = ManualClock::at(noon() - Duration::days(10));
        let analytics = InMemoryViewAnalytics::with_clock(clock.clone());

        // Two views in the prior week
        analytics.record_view(view("alice", Some("a"))).await.unwrap();
        analytics.record_view(view("alice", Some("b"))).await.unwrap();

        // Three views this week, one of them today
        clock.advance(Duration::days(7));
        analytics.record_view(view("alice", Some("c"))).await.unwrap();
        analytics.record_view(view("alice", Some("d"))).await.unwrap();
        clock.advance(Duration::days(3));
        analytics.record_view(view("alice", Some("e"))).await.unwrap();

        let stats = analytics.get_stats("alice").await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.today, 1);
        assert_eq!(stats.this_week, 3);
        assert_eq!(stats.this_month, 5);
        assert_eq!(stats.trend.percentage, 50);
        assert_eq!(stats.trend.direction, TrendDirection::Up);

        assert_eq!(stats.daily.len(), 7);
        assert_eq!(stats.daily.last().unwrap().date, noon().date_naive());
        assert_eq!(stats.daily.last().unwrap().views, 1);
        assert_eq!(stats.daily.iter().map(|d| d.views).sum::<u64>(), 3);

        assert_eq!(stats.recent_viewers[0].viewer_id, "e");
    }

    #[tokio::test]
    async fn test_recent_viewers_capped() {
        let clock = ManualClock::at(noon());
        let analytics = InMemoryViewAnalytics::with_clock(clock.clone());
        for i in 0..15 {
            analytics
                .record_view(view("alice", Some(&format!("viewer-{i}"))))
                .await
                .unwrap();
            clock.advance(Duration::seconds(1));
        }

        let stats = analytics.get_stats("alice").await.unwrap();
        assert_eq!(stats.recent_viewers.len(), RECENT_VIEWERS_LIMIT);
        assert_eq!(stats.recent_viewers[0].viewer_id, "viewer-14");
    }
}
