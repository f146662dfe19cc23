use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use receval::config::Config;
use receval::context::AppContext;
use receval::logging::{log, obj, v_str, Domain, Level};
use receval::router::{NavigationOutcome, ViewRouter};
use receval::session::RestoreOutcome;
use receval::views::{NullLayer, StandardViews};

fn outcome_json(fragment: &str, outcome: &NavigationOutcome) -> serde_json::Value {
    let mut line = json!({ "requested": fragment, "outcome": outcome.label() });
    match outcome {
        NavigationOutcome::Redirected { to, .. } => line["to"] = json!(to.fragment()),
        NavigationOutcome::Activated { route, constructed } => {
            line["route"] = json!(route.fragment());
            line["constructed"] = json!(constructed);
        }
        NavigationOutcome::Failed { route, message } => {
            line["route"] = json!(route.fragment());
            line["message"] = json!(message);
        }
        NavigationOutcome::Superseded { route } => line["route"] = json!(route.fragment()),
        NavigationOutcome::Ignored | NavigationOutcome::Stayed => {}
    }
    line
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let mut ctx = AppContext::from_config(cfg)?;

    if let RestoreOutcome::Restored(identity) = ctx.init() {
        eprintln!("[receval] restored session for {}", identity.name);
    }

    if let (Ok(user), Ok(password)) = (std::env::var("LOGIN_USER"), std::env::var("LOGIN_PASSWORD")) {
        match ctx.sign_in(&user, &password).await {
            Ok(signed_in) => {
                log(
                    Level::Info,
                    Domain::Session,
                    "signed_in",
                    obj(&[
                        ("user", v_str(&signed_in.identity.name)),
                        ("admin", json!(signed_in.identity.is_admin())),
                        ("invite_pending", json!(signed_in.invite_pending)),
                    ]),
                );
            }
            Err(err) => eprintln!("[receval] sign-in failed: {}", err.user_message()),
        }
    }

    let mut routes: Vec<String> = std::env::args().skip(1).collect();
    if routes.is_empty() {
        routes.push("home".to_string());
    }

    let mut router = ViewRouter::new(StandardViews, Arc::new(NullLayer));
    for fragment in &routes {
        let outcome = router.navigate(&ctx, fragment).await;
        println!("{}", outcome_json(fragment, &outcome));
    }

    // leaving the last page counts as navigating away
    if let Err(err) = ctx.flush_settings().await {
        if ctx.user_name().is_some() {
            eprintln!("[receval] settings not saved: {}", err.user_message());
        }
    }
    Ok(())
}
