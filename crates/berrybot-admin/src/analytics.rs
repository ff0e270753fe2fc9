//! View model for the analytics dashboard.

use std::fmt;

use berrybot_core::protocol::AnalyticsReport;
use berrybot_core::types::{location_coordinates, Timeframe, CATEGORIES};

/// One bar of the category chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub name: &'static str,
    pub count: u64,
}

/// One pin on the location map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Analytics report shaped for display.
///
/// Categories always follow the fixed category list, with zero for any the
/// report omits. Locations without known coordinates are left off the map
/// but still counted in `user_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsView {
    pub timeframe: Timeframe,
    pub start_date: String,
    pub end_date: String,
    pub user_count: u64,
    pub categories: Vec<CategoryCount>,
    pub markers: Vec<MapMarker>,
}

impl AnalyticsView {
    pub fn from_report(report: &AnalyticsReport) -> Self {
        let categories = CATEGORIES
            .iter()
            .map(|&name| CategoryCount {
                name,
                count: report.categories.get(name).copied().unwrap_or(0),
            })
            .collect();

        let markers = report
            .locations
            .iter()
            .filter_map(|name| {
                let (latitude, longitude) = location_coordinates(name)?;
                Some(MapMarker {
                    name: name.clone(),
                    latitude,
                    longitude,
                })
            })
            .collect();

        Self {
            timeframe: report.timeframe,
            start_date: report.start_date.clone(),
            end_date: report.end_date.clone(),
            user_count: report.user_count,
            categories,
            markers,
        }
    }

    pub fn total_queries(&self) -> u64 {
        self.categories.iter().map(|c| c.count).sum()
    }
}

impl From<&AnalyticsReport> for AnalyticsView {
    fn from(report: &AnalyticsReport) -> Self {
        Self::from_report(report)
    }
}

impl fmt::Display for AnalyticsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} analytics ({} to {})",
            self.timeframe.display_name(),
            self.start_date,
            self.end_date
        )?;
        writeln!(f, "Users: {}", self.user_count)?;
        writeln!(f)?;
        writeln!(f, "Categories:")?;
        let width = CATEGORIES.iter().map(|c| c.len()).max().unwrap_or(0);
        for c in &self.categories {
            writeln!(f, "  {:<width$}  {}", c.name, c.count, width = width)?;
        }
        writeln!(f)?;
        writeln!(f, "Locations:")?;
        if self.markers.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for m in &self.markers {
            writeln!(f, "  {} ({:.4}, {:.4})", m.name, m.latitude, m.longitude)?;
        }
        Ok(())
    }
}
