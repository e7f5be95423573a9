//! Authentication commands.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use std::io::{self, Write};
use topup_cli::ClientContext;
use topup_types::{RegisterRequest, User};

/// Login with email and password.
pub async fn login(
    context: &ClientContext,
    email: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let session = &context.session;
    if context.tokens.access_token().is_some() && session.check_auth().await? {
        if let Some(user) = session.user() {
            output::print_success(&format!("Already logged in as {}", user.email), format);
            return Ok(());
        }
    }

    let email = match email {
        Some(email) => email.trim().to_string(),
        None => prompt("Email: ")?,
    };
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    match session.login(&email, &password).await {
        Ok(user) => output::print_success(&format!("Logged in as {}", user.email), format),
        Err(e) => output::print_error(&format!("Login failed: {}", e), format),
    }

    Ok(())
}

/// Create an account and sign in.
pub async fn register(
    context: &ClientContext,
    email: String,
    phone: String,
    full_name: String,
    format: &OutputFormat,
) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    let request = RegisterRequest {
        email,
        phone,
        password,
        full_name,
    };
    match context.session.register(&request).await {
        Ok(user) => output::print_success(&format!("Registered as {}", user.email), format),
        Err(e) => output::print_error(&format!("Registration failed: {}", e), format),
    }

    Ok(())
}

/// Logout and clear session.
pub async fn logout(context: &ClientContext, format: &OutputFormat) -> Result<()> {
    context.session.logout().await?;
    output::print_success("Logged out", format);
    Ok(())
}

/// Validate the stored session and show the user.
pub async fn whoami(context: &ClientContext, format: &OutputFormat) -> Result<()> {
    if !super::require_login(context, format) {
        return Ok(());
    }

    if !context.session.check_auth().await? {
        output::print_error("Session expired. Please login again", format);
        return Ok(());
    }

    match context.session.user() {
        Some(user) if format.is_json() => output::print_json(&user),
        Some(user) => print_user(&user),
        None => output::print_error("No user profile available", format),
    }
    Ok(())
}

fn print_user(user: &User) {
    output::print_heading("Signed in");
    output::print_row("Name", &user.name);
    output::print_row("Email", &user.email);
    output::print_row("Role", &user.role);
    if let Some(phone) = &user.phone {
        output::print_row("Phone", phone);
    }
    output::print_row("User ID", &user.id);
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
