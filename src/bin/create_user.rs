use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use federation_api::auth::validation::{
    is_long_enough_password, is_valid_email, is_valid_username, normalize_email,
};
use federation_api::auth::{AuthError, NewUser, PasswordService, UserStore};
use federation_api::db::run_migrations;
use federation_api::models::Role;

#[derive(Parser, Debug)]
#[command(
    name = "create_user",
    about = "Create an administrator or moderator account"
)]
struct Args {
    /// Login name (3-30 printable characters).
    #[arg(long)]
    username: String,

    /// Email address used for password resets.
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,

    /// Role to assign (`admin` or `moderator`).
    #[arg(long, default_value = "admin")]
    role: String,

    /// Force a password change on first login.
    #[arg(long)]
    needs_password_change: bool,
}

fn fail(message: &str) -> ! {
    let _ = writeln!(io::stderr(), "error: {message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let username = args.username.trim().to_string();
    let email = normalize_email(&args.email);

    if !is_valid_username(&username) {
        fail("username must be 3-30 printable characters");
    }
    if !is_valid_email(&email) {
        fail("email address is not valid");
    }
    if !is_long_enough_password(&args.password) {
        fail("password must be at least 8 characters long");
    }
    let Some(role) = Role::parse(args.role.trim().to_lowercase().as_str()) else {
        fail(&format!(
            "unsupported role '{}'. Use 'admin' or 'moderator'.",
            args.role
        ));
    };

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    run_migrations(&pool).await?;

    let users = UserStore::new(pool, Arc::new(PasswordService::new()?));
    let user = match users
        .insert(NewUser {
            username,
            email,
            password: args.password,
            role,
            needs_password_change: args.needs_password_change,
        })
        .await
    {
        Ok(user) => user,
        Err(AuthError::Duplicate(field)) => fail(field.message()),
        Err(err) => return Err(err.into()),
    };

    println!(
        "Created {} '{}' <{}> with id {}",
        user.role, user.username, user.email, user.id
    );
    Ok(())
}
