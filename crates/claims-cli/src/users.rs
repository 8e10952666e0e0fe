use claims_core::{
    records::UserRepository,
    users::{Role, User, UserUpdate},
};
use color_eyre::{eyre::bail, Result};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::cli::UserCommand;

const SEED_HR_EMAIL: &str = "hr@example.com";
const SEED_HR_PASSWORD: &str = "P@ssw0rd";

/// Execute a user subcommand against the record store.
pub fn handle(cmd: UserCommand, store: &impl UserRepository) -> Result<()> {
    match cmd {
        UserCommand::Add {
            name,
            surname,
            email,
            role,
            rate,
            password,
        } => {
            let user = create_user(store, User::new(name, surname, email, role, rate), &password)?;
            println!("Created user {}: {} <{}> ({})", user.id, user.full_name(), user.email, user.role);
            println!("Share the credentials with the user.");
        }
        UserCommand::List => {
            let users = store.get_all_users();
            if users.is_empty() {
                println!("No users yet. Add one with `claims user add`.");
                return Ok(());
            }
            for u in users {
                println!(
                    "{} - {} - {} - Role: {} - Hourly: R{:.2}",
                    u.id,
                    u.full_name(),
                    u.email,
                    u.role,
                    u.hourly_rate
                );
            }
        }
        UserCommand::Edit {
            id,
            name,
            surname,
            email,
            role,
            rate,
        } => {
            if let Some(email) = &email {
                if store.get_user_by_email(email).is_some_and(|other| other.id != id) {
                    bail!("Email already exists.");
                }
            }
            let update = UserUpdate {
                name,
                surname,
                email,
                role,
                hourly_rate: rate,
            };
            if !store.update_user(id, update) {
                bail!("user {id} not found");
            }
            println!("User updated.");
        }
        UserCommand::Remove { id } => {
            if !store.delete_user(id) {
                bail!("user {id} not found");
            }
            println!("User removed.");
        }
        UserCommand::Verify { email, password } => {
            match store.validate_user(&email, &hash_password(&password)) {
                Some(user) => println!("Valid credentials for {} ({})", user.full_name(), user.role),
                None => bail!("invalid email or password"),
            }
        }
    }

    Ok(())
}

/// Add `user` with a hashed password, refusing duplicate emails.
pub fn create_user(store: &impl UserRepository, user: User, password: &str) -> Result<User> {
    if store.get_user_by_email(&user.email).is_some() {
        bail!("Email already exists.");
    }
    Ok(store.add_user(user.with_password_hash(hash_password(password))))
}

/// SHA-256 of the UTF-8 password as upper-case hex.
pub fn hash_password(password: &str) -> String {
    Sha256::digest(password.as_bytes())
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect()
}

/// Create the bootstrap HR account when no HR user exists yet.
pub fn seed_hr_user(store: &impl UserRepository) -> Option<User> {
    if store.get_all_users().iter().any(|u| u.role == Role::Hr) {
        return None;
    }
    let hr = User::new("System", "HR", SEED_HR_EMAIL, Role::Hr, Decimal::ZERO)
        .with_password_hash(hash_password(SEED_HR_PASSWORD));
    let hr = store.add_user(hr);
    warn!(email = SEED_HR_EMAIL, "seeded default HR account; change its password");
    Some(hr)
}
