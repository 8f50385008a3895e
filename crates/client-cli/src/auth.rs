//! Account commands: login, signup, logout, whoami, password

use anyhow::{anyhow, bail, Result};
use prodent_client::{AuthFailure, AuthStatus, SignUpOutcome, SignUpStep};
use std::io::{self, Write};

use crate::app::App;

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn confirm(label: &str) -> Result<bool> {
    let answer = prompt(&format!("{} [y/N] ", label))?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn auth_error(err: AuthFailure) -> anyhow::Error {
    tracing::debug!("Auth failure: {:?}", err);
    anyhow!("{}", err.notice())
}

pub async fn login(app: &App, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = prompt("Password: ")?;

    app.store
        .sign_in(&email, &password)
        .await
        .map_err(auth_error)?;

    let state = app.store.current_state();
    println!("\x1b[1;32m✅ Login successful!\x1b[0m");
    match &state.company {
        Some(company) => println!("\x1b[90mCompany: {}\x1b[0m", company.name),
        None => println!("\x1b[33mThis account is not linked to a company yet.\x1b[0m"),
    }
    Ok(())
}

pub async fn signup(app: &App, email: String, company: String) -> Result<()> {
    let password = prompt("Password: ")?;
    let confirmation = prompt("Confirm password: ")?;
    if password != confirmation {
        return Err(auth_error(AuthFailure::PasswordMismatch));
    }

    let mut outcome = app.store.sign_up(&email, &password, &company).await;
    while let Some(step) = outcome.failed_step() {
        report_partial(&outcome);
        if step == SignUpStep::CreateIdentity || !confirm("Retry finishing account setup?")? {
            bail!("Sign-up did not complete");
        }
        outcome = app.store.resume_sign_up(&outcome, &company).await;
    }

    println!("\x1b[1;32m✅ Account created for {}\x1b[0m", email);
    if !app.store.current_state().is_authenticated() {
        println!("Confirm your email address, then run '\x1b[1mprodent login\x1b[0m'.");
    }
    Ok(())
}

fn report_partial(outcome: &SignUpOutcome) {
    let Some(error) = &outcome.error else {
        return;
    };
    tracing::warn!("Sign-up stopped at {:?}: {}", error.step, error.cause);
    eprintln!("\x1b[31m✗ {}\x1b[0m", error.notice());
    if let Some(user) = &outcome.user {
        eprintln!("\x1b[90mIdentity {} was created\x1b[0m", user.id);
    }
    if let Some(company) = &outcome.company {
        eprintln!("\x1b[90mCompany {} ({}) was created\x1b[0m", company.name, company.id);
    }
}

pub async fn logout(app: &App) -> Result<()> {
    if let Err(e) = app.store.sign_out().await {
        tracing::warn!("Remote sign-out failed: {}", e);
        eprintln!("\x1b[33mCould not reach the server; the local session was removed anyway.\x1b[0m");
    }
    println!("\x1b[32m✅ Logged out successfully\x1b[0m");
    Ok(())
}

pub async fn whoami(app: &App) -> Result<()> {
    let state = app.store.current_state();
    match state.status() {
        AuthStatus::Authenticated | AuthStatus::AuthenticatedNoCompany => {
            let email = state
                .user
                .as_ref()
                .and_then(|u| u.email.clone())
                .unwrap_or_default();
            println!("\x1b[32m✓ Logged in\x1b[0m as {}", email);
            match &state.company {
                Some(company) => println!("Company: {} ({})", company.name, company.id),
                None => println!("Company: \x1b[33mnone\x1b[0m"),
            }
            match app.store.guard().validate().await {
                Ok(_) => println!("Session: verified"),
                Err(failure) => println!("Session: {}", failure.notice()),
            }
        }
        AuthStatus::Failed => {
            let notice = state.error.map(|n| n.to_string()).unwrap_or_default();
            println!("\x1b[31m✗ {}\x1b[0m", notice);
        }
        AuthStatus::Anonymous | AuthStatus::Loading => {
            println!("\x1b[33m✗ Not logged in\x1b[0m");
            println!("Run '\x1b[1mprodent login\x1b[0m' to authenticate");
        }
    }
    Ok(())
}

pub async fn password(app: &App) -> Result<()> {
    app.require_session("/dashboard/profile")?;
    let password = prompt("New password: ")?;
    let confirmation = prompt("Confirm new password: ")?;

    app.store
        .update_password(&password, &confirmation)
        .await
        .map_err(auth_error)?;

    println!("\x1b[32m✅ Password updated\x1b[0m");
    Ok(())
}
