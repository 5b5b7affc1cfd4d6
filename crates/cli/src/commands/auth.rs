//! Account commands.

use cookmaster_client::AppState;
use cookmaster_client::services::auth::SignUpOutcome;

use super::CliError;

/// Sign in and persist the session.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<(), CliError> {
    let user = state.session().sign_in(email, password).await?;
    println!("Signed in as {}", user.email.as_deref().unwrap_or(email));
    Ok(())
}

/// Create an account.
pub async fn register(state: &AppState, email: &str, password: &str) -> Result<(), CliError> {
    match state.session().sign_up(email, password).await? {
        SignUpOutcome::SignedIn(user) => {
            println!("Account created. Signed in as {}", user.email.as_deref().unwrap_or(email));
        }
        SignUpOutcome::ConfirmationRequired { email } => {
            println!("Account created. Check {email} for a confirmation link, then log in.");
        }
    }
    Ok(())
}

/// Sign out and forget per-user state.
pub async fn logout(state: &AppState) -> Result<(), CliError> {
    if !state.session().is_logged_in().await {
        println!("Not signed in");
        return Ok(());
    }
    state.sign_out().await?;
    Ok(())
}

/// Print the signed-in user.
pub async fn whoami(state: &AppState) -> Result<(), CliError> {
    match state.session().current_user().await {
        Some(user) => println!(
            "{} ({})",
            user.email.as_deref().unwrap_or("unknown email"),
            user.id
        ),
        None => println!("Not signed in"),
    }
    Ok(())
}
