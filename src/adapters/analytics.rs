// Analytics adapters: rep and region slices of unified analytics, plus the
// goal-driven procedure ranking.

use std::cmp::Ordering;

use serde::Serialize;

use crate::types::{AnalyticsType, ProcedurePerformance, TerritoryRecord, UnifiedAnalytics};

/// Procedures returned by `top_procedures_for_goals`.
const TOP_PROCEDURES_LIMIT: usize = 10;

const AESTHETIC_CATEGORIES: [&str; 3] = ["Injectables", "Facial Aesthetic", "Breast Procedures"];

/// Rep-level analytics, order preserved.
pub fn rep_analytics(analytics: &[UnifiedAnalytics]) -> Vec<UnifiedAnalytics> {
    analytics
        .iter()
        .filter(|a| a.analytics_type == AnalyticsType::Rep)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAnalytics {
    pub analytics: Vec<UnifiedAnalytics>,
    pub territories: Vec<TerritoryRecord>,
}

/// Region and territory analytics. With a territory code, territory records
/// are narrowed to that exact code; analytics rows are not.
pub fn region_analytics(
    analytics: &[UnifiedAnalytics],
    territories: &[TerritoryRecord],
    territory_code: Option<&str>,
) -> RegionAnalytics {
    let analytics = analytics
        .iter()
        .filter(|a| {
            matches!(
                a.analytics_type,
                AnalyticsType::Region | AnalyticsType::Territory
            )
        })
        .cloned()
        .collect();

    let territories = territories
        .iter()
        .filter(|t| territory_code.map_or(true, |code| t.territory_code == code))
        .cloned()
        .collect();

    RegionAnalytics {
        analytics,
        territories,
    }
}

enum GoalFilter {
    NameContains(&'static str),
    Category(&'static [&'static str]),
}

impl GoalFilter {
    fn parse(goal: &str) -> Option<Self> {
        let goal = goal.to_lowercase();
        if goal.contains("botox") {
            Some(GoalFilter::NameContains("botox"))
        } else if goal.contains("implant") {
            Some(GoalFilter::NameContains("dental implants"))
        } else if goal.contains("aesthetic") {
            Some(GoalFilter::Category(&AESTHETIC_CATEGORIES))
        } else {
            None
        }
    }

    fn matches(&self, procedure: &ProcedurePerformance) -> bool {
        match self {
            GoalFilter::NameContains(needle) => {
                procedure.procedure_name.to_lowercase().contains(needle)
            }
            GoalFilter::Category(categories) => categories
                .iter()
                .any(|c| *c == procedure.procedure_category),
        }
    }
}

/// Largest-market procedures matching any recognised goal. Goals that match
/// no known keyword are ignored; with none recognised, every procedure is a
/// candidate.
pub fn top_procedures_for_goals(
    procedures: &[ProcedurePerformance],
    goals: &[&str],
) -> Vec<ProcedurePerformance> {
    let filters: Vec<GoalFilter> = goals.iter().filter_map(|g| GoalFilter::parse(g)).collect();

    let mut matched: Vec<ProcedurePerformance> = procedures
        .iter()
        .filter(|p| filters.is_empty() || filters.iter().any(|f| f.matches(p)))
        .cloned()
        .collect();

    matched.sort_by(|a, b| {
        b.market_size_millions
            .partial_cmp(&a.market_size_millions)
            .unwrap_or(Ordering::Equal)
    });
    matched.truncate(TOP_PROCEDURES_LIMIT);
    matched
}
