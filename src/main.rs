//! `suis`: start an intelligence session, let it load, print what it sees.
//!
//! Talks to the configured remote store when `~/.repspheres/suis.json` has a
//! `gateway` block; otherwise runs against built-in demo data.
//!
//! Usage: suis [--user <id>] [--wait <seconds>] [--ticker] [--summary]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use suis_lib::gateway::memory::InMemoryGateway;
use suis_lib::gateway::rest::RestGateway;
use suis_lib::gateway::ChangeKind;
use suis_lib::types::{
    IntelligenceInsight, IntelligentNotification, ProcedurePerformance, TerritoryRecord,
    UnifiedAnalytics,
};
use suis_lib::{load_config, Collection, IntelligenceGateway, IntelligenceSession, TickerFeed};

const DEMO_USER: &str = "demo-rep";

struct Args {
    user_id: Option<String>,
    wait: Duration,
    ticker: bool,
    summary: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        user_id: None,
        wait: Duration::from_secs(2),
        ticker: false,
        summary: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--user" => args.user_id = Some(it.next().context("--user needs a value")?),
            "--wait" => {
                let secs: u64 = it
                    .next()
                    .context("--wait needs a value")?
                    .parse()
                    .context("--wait must be a number of seconds")?;
                args.wait = Duration::from_secs(secs);
            }
            "--ticker" => args.ticker = true,
            "--summary" => args.summary = true,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;

    let (gateway, demo): (Arc<dyn IntelligenceGateway>, Option<InMemoryGateway>) =
        match &config.gateway {
            Some(gw) => {
                let rest = RestGateway::new(gw)
                    .map_err(|e| anyhow::anyhow!("Failed to build gateway: {e}"))?;
                (Arc::new(rest), None)
            }
            None => {
                log::info!("No gateway configured, using demo data");
                let demo = demo_gateway()?;
                (Arc::new(demo.clone()), Some(demo))
            }
        };

    let user_id = args
        .user_id
        .or_else(|| config.user_id.clone())
        .or_else(|| demo.as_ref().map(|_| DEMO_USER.to_string()));

    if args.ticker {
        let feed = TickerFeed::start(gateway, user_id, &config);
        tokio::time::sleep(args.wait).await;
        println!("{}", serde_json::to_string_pretty(&feed.items())?);
        feed.session().shutdown();
        return Ok(());
    }

    let mut options = config.options();
    options.user_id = user_id;
    let session = IntelligenceSession::start(gateway, options, &config);

    if let Some(demo) = &demo {
        // Exercise the push path once the first load is in.
        tokio::time::sleep(args.wait / 2).await;
        demo.emit(Collection::Notifications, ChangeKind::Insert, None);
    }
    tokio::time::sleep(args.wait).await;

    if args.summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&session.notification_summary())?
        );
    } else {
        println!("{}", serde_json::to_string_pretty(&session.view())?);
    }

    session.shutdown();
    Ok(())
}

fn demo_gateway() -> anyhow::Result<InMemoryGateway> {
    let now = Utc::now();
    let gateway = InMemoryGateway::new();

    let insights: Vec<IntelligenceInsight> = serde_json::from_value(json!([
        {
            "id": "demo-ins-1",
            "user_id": DEMO_USER,
            "insight_type": "procedure_opportunity",
            "data_source": "pipeline",
            "correlation_score": 88,
            "urgency_level": "urgent",
            "insight_data": { "procedure": "Botox", "market_size": 42, "action": "Book a demo" },
            "procedure_tags": ["botox", "injectables"],
            "created_at": now,
        },
        {
            "id": "demo-ins-2",
            "user_id": DEMO_USER,
            "insight_type": "competitive_intel",
            "correlation_score": 71,
            "urgency_level": "standard",
            "insight_data": { "affected_procedure": "Dermal Fillers", "message": "New entrant pricing 15% lower" },
            "created_at": now - ChronoDuration::hours(3),
        }
    ]))?;
    gateway.set_insights(insights);

    let procedures: Vec<ProcedurePerformance> = serde_json::from_value(json!([
        {
            "id": "demo-proc-1",
            "user_id": DEMO_USER,
            "procedure_name": "Botox Cosmetic",
            "procedure_category": "Injectables",
            "market_size_millions": 420.0,
            "growth_percentage": 8.5
        },
        {
            "id": "demo-proc-2",
            "user_id": DEMO_USER,
            "procedure_name": "Dental Implants",
            "procedure_category": "Restorative",
            "market_size_millions": 610.0,
            "growth_percentage": 6.1
        }
    ]))?;
    gateway.set_procedures(procedures);

    let analytics: Vec<UnifiedAnalytics> = serde_json::from_value(json!([
        { "id": "demo-an-1", "user_id": DEMO_USER, "analytics_type": "rep",
          "metric_name": "calls_per_week", "metric_value": 34, "trend_direction": "up" },
        { "id": "demo-an-2", "user_id": DEMO_USER, "analytics_type": "region",
          "metric_name": "market_share", "metric_value": 0.18, "trend_direction": "stable" }
    ]))?;
    gateway.set_analytics(analytics);

    let notifications: Vec<IntelligentNotification> = serde_json::from_value(json!([
        {
            "id": "demo-n-1",
            "user_id": DEMO_USER,
            "notification_type": "call_timing",
            "priority_level": 4,
            "title": "Best time to call Dr. Patel",
            "message": "Historically answers between 2 and 3pm",
            "action_data": { "contact_id": "c-101" },
            "read_status": false,
            "created_at": now,
        },
        {
            "id": "demo-n-2",
            "user_id": DEMO_USER,
            "notification_type": "goal_progress",
            "priority_level": 2,
            "title": "Quarterly goal 70% complete",
            "read_status": true,
            "created_at": now - ChronoDuration::days(1),
        }
    ]))?;
    gateway.set_notifications(notifications);

    let territories: Vec<TerritoryRecord> = serde_json::from_value(json!([
        { "id": "demo-t-1", "user_id": DEMO_USER, "territory_code": "NYC-01",
          "opportunity_score": 82.0, "practice_count": 412 }
    ]))?;
    gateway.set_territories(territories);

    Ok(gateway)
}
