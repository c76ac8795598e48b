use std::sync::Arc;

use geopresence::{
    AppError, AppState,
    config::{Config, ConfigError},
    models::{GeoPoint, LocationFix, load_points_of_interest},
    presence::{FeedHandle, LoggingView, ObservedUserTracker},
    registration::{RegistrationForm, register},
    session::SessionContext,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, PartialEq)]
enum Command {
    Fix(GeoPoint),
    Online,
    Offline,
    Watch(String),
    Unwatch,
    Roster,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    match line.split_once(' ') {
        Some(("watch", id)) if !id.trim().is_empty() => Some(Command::Watch(id.trim().to_owned())),
        _ => match line {
            "online" => Some(Command::Online),
            "offline" => Some(Command::Offline),
            "unwatch" => Some(Command::Unwatch),
            "roster" => Some(Command::Roster),
            "quit" | "exit" => Some(Command::Quit),
            _ => LocationFix::parse_point(line).map(Command::Fix),
        },
    }
}

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "presence client stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // 加载配置
    let config = Config::from_env()?;
    let identity = config
        .identity
        .clone()
        .ok_or(ConfigError::Missing("PRESENCE_EMAIL"))?;
    let state = AppState::from_config(config)?;
    tracing::info!(backend = ?state.config.store_backend, "store ready");

    // 本地身份服务每次启动都是空的，先注册再登录
    let form = RegistrationForm {
        name: identity.name.clone(),
        surname: identity.surname.clone(),
        email: identity.email.clone(),
        password: identity.password.clone(),
        id_number: identity.id_number.clone(),
        ..Default::default()
    };
    register(state.identity.as_ref(), state.store.as_ref(), &form).await?;

    let session = SessionContext::sign_in(
        Arc::clone(&state.identity),
        Arc::clone(&state.store),
        &identity.email,
        &identity.password,
    )
    .await?;

    // 兴趣点加载失败不影响运行
    if let Some(path) = &state.config.poi_path {
        match load_points_of_interest(path).await {
            Ok(points) => {
                for point in points {
                    tracing::info!(name = %point.name, lat = point.latitude, lon = point.longitude, "point of interest");
                }
            }
            Err(e) => tracing::error!(error = %e, "error loading points of interest"),
        }
    }

    let view = Arc::new(LoggingView);
    let synchronizer = session.synchronizer(view.clone(), view.clone());
    let roster_feed = synchronizer.attach().await?;
    if let Err(e) = synchronizer.load_initial().await {
        tracing::warn!(error = %e, "starting with an empty roster");
    }

    let publisher = session.publisher();
    let mut watching: Option<(Arc<ObservedUserTracker>, FeedHandle)> = None;
    let mut had_fix = false;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!(user_id = %session.user_id(), "ready: <lat>,<lon> | online | offline | watch <id> | unwatch | roster | quit");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                drop(watching);
                roster_feed.close();
                if let Err(e) = session.dispose().await {
                    tracing::warn!(error = %e, "offline write was not applied");
                }
                return Ok(());
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(Command::Fix(point)) => {
                let fix = if had_fix {
                    LocationFix::Fix(point)
                } else {
                    had_fix = true;
                    LocationFix::FirstFix(point)
                };
                let tracker = watching.as_ref().map(|(tracker, _)| tracker.as_ref());
                publisher
                    .follow_fixes(futures_util::stream::iter([fix]), tracker)
                    .await;
            }
            Some(Command::Online) => {
                session.go_online();
            }
            Some(Command::Offline) => {
                session.go_offline();
            }
            Some(Command::Watch(id)) => {
                let seed = synchronizer.get(&id).await.map(|entry| entry.position());
                let tracker = session.tracker(&id, seed, view.clone());
                let handle = tracker.attach().await?;
                tracing::info!(user_id = %tracker.observed_id(), "watching");
                watching = Some((tracker, handle));
            }
            Some(Command::Unwatch) => {
                if let Some((tracker, handle)) = watching.take() {
                    handle.close();
                    tracing::info!(user_id = %tracker.observed_id(), "stopped watching");
                }
            }
            Some(Command::Roster) => {
                for entry in synchronizer.entries().await {
                    tracing::info!(user_id = %entry.id, name = %entry.name, lat = entry.latitude, lon = entry.longitude, "roster");
                }
            }
            Some(Command::Quit) => break,
            None => tracing::warn!(input = %line.trim(), "unrecognised command"),
        }
    }

    drop(watching);
    roster_feed.close();
    if let Err(e) = session.logout().await.await {
        tracing::warn!(error = %e, "offline write was not applied");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("4.6,-74.0"), Some(Command::Fix(GeoPoint::new(4.6, -74.0))));
        assert_eq!(parse_command(" online "), Some(Command::Online));
        assert_eq!(parse_command("watch u1"), Some(Command::Watch("u1".into())));
        assert_eq!(parse_command("watch "), None);
        assert_eq!(parse_command("exit"), Some(Command::Quit));
        assert_eq!(parse_command("dance"), None);
    }
}
