use std::sync::{Arc, RwLock};

use anyhow::bail;
use clap::Parser;

mod app;
mod auth;
mod classifier;
mod cli;
mod config;
mod db;
mod eid;
mod errors;
mod matching;
mod notify;
mod records;
mod scoring;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use eid::Eid;
use records::ItemCreate;
use serde_json::json;

pub fn parse_keywords(keywords: String) -> Vec<String> {
    keywords
        .split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let data_dir = args.data_dir.unwrap_or_else(config::default_data_dir);
    let config = Arc::new(RwLock::new(Config::load_with(&data_dir)));
    let app = app::App::new(config.clone(), &data_dir)?;

    match args.command {
        cli::Command::Daemon {} => {
            web::start_daemon(app);
            Ok(())
        }

        cli::Command::Signup {
            name,
            email,
            password,
        } => {
            let user = app.signup(&name, &email, &password)?;
            println!("{}", serde_json::to_string_pretty(&user).unwrap());
            Ok(())
        }

        cli::Command::Login { email, password } => match app.login(&email, &password)? {
            Some(user) => {
                println!("{}", serde_json::to_string_pretty(&user).unwrap());
                Ok(())
            }
            None => bail!("invalid email or password"),
        },

        cli::Command::Logout {} => {
            app.logout()?;
            println!("logged out");
            Ok(())
        }

        cli::Command::Whoami {} => {
            match app.current_user()? {
                Some(user) => println!("{}", serde_json::to_string_pretty(&user).unwrap()),
                None => println!("not logged in"),
            }
            Ok(())
        }

        cli::Command::Report {
            kind,
            name,
            description,
            category,
            brand,
            date,
            time,
            location,
            image,
            identifying_features,
            reward,
            keywords,
        } => {
            let image = match image {
                Some(path) => Some(std::fs::read(&path)?),
                None => None,
            };

            let create = ItemCreate {
                name,
                description,
                category,
                brand,
                date,
                time,
                location,
                image_url: None,
                identifying_features,
                reward: if reward { Some(true) } else { None },
                keywords: keywords.map(parse_keywords).unwrap_or_default(),
            };

            let outcome = app.report_item(kind.into(), create, image)?;
            println!("{}", serde_json::to_string_pretty(&outcome).unwrap());
            Ok(())
        }

        cli::Command::Search { query, image, item } => {
            let anchor = item.map(Eid::from);

            if let Some(path) = image {
                let bytes = std::fs::read(&path)?;
                let (analysis, hits) = app.search_image(&bytes, anchor.as_ref())?;
                let output = json!({ "analysis": analysis, "matches": hits });
                println!("{}", serde_json::to_string_pretty(&output).unwrap());
                return Ok(());
            }

            let Some(query) = query else {
                bail!("provide a text query or --image");
            };

            let hits = app.search_text(&query, anchor.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&hits).unwrap());
            Ok(())
        }

        cli::Command::Candidates { item_id } => {
            let hits = app.find_candidates(&Eid::from(item_id))?;
            println!("{}", serde_json::to_string_pretty(&hits).unwrap());
            Ok(())
        }

        cli::Command::Matches { item_id } => {
            let matches = app.matches_for_item(&Eid::from(item_id))?;
            println!("{}", serde_json::to_string_pretty(&matches).unwrap());
            Ok(())
        }

        cli::Command::Feedback { match_id, verdict } => {
            let positive = matches!(verdict, cli::VerdictArg::Up);
            let m = app.feedback(&Eid::from(match_id), positive)?;
            println!("{}", serde_json::to_string_pretty(&m).unwrap());
            Ok(())
        }

        cli::Command::Contact {
            match_id,
            item_id,
            message,
        } => {
            app.contact_owner(&Eid::from(match_id), &Eid::from(item_id), &message)?;
            println!("message sent");
            Ok(())
        }

        cli::Command::Notifications {} => {
            let notifications = app.notifications(None)?;
            println!("{}", serde_json::to_string_pretty(&notifications).unwrap());
            Ok(())
        }

        cli::Command::MarkRead { id } => {
            app.mark_read(&Eid::from(id))?;
            Ok(())
        }
    }
}
