//! Admin account and authentication resolution.
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::Result;
use regex::Regex;
use tracing::info;

use super::ResolverContext;
use crate::{
    error::DeployError,
    interaction::{
        InputPromptValidator, InputValidator, InputValidatorResult, PasswordPrompt,
        PasswordPromptOptions, PasswordPromptResult,
    },
    models::{AuthenticationType, CreateRequest, DEFAULT_ADMIN_USERNAME, OsType, Secret},
};

static LINUX_USERNAME_FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[\\/"\[\]:|<>+=;,?*@#()!A-Z]+"#).expect("valid regex")
});
static WINDOWS_USERNAME_FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/"\[\]:|<>+=;,?*@]+"#).expect("valid regex"));
static PASSWORD_SPECIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[ `~!@#$%^&*()=+_\[\]{}\\|;:./'",<>?]"#).expect("valid regex")
});

const DISALLOWED_USERNAMES: [&str; 30] = [
    "administrator",
    "admin",
    "user",
    "user1",
    "test",
    "user2",
    "test1",
    "user3",
    "admin1",
    "1",
    "123",
    "a",
    "actuser",
    "adm",
    "admin2",
    "aspnet",
    "backup",
    "console",
    "guest",
    "owner",
    "root",
    "server",
    "sql",
    "support",
    "support_388945a0",
    "sys",
    "test2",
    "test3",
    "user4",
    "user5",
];

const PASSWORD_MIN_LENGTH: usize = 12;
const SSH_KEY_PREFIXES: [&str; 3] = ["ssh-rsa ", "ssh-ed25519 ", "ecdsa-sha2-"];

/// Admin account of the OS profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub admin_username: String,
    pub authentication_type: AuthenticationType,
    pub admin_password: Option<Secret>,
    /// Public key contents, not paths.
    pub ssh_keys: Vec<String>,
    pub ssh_dest_key_path: Option<String>,
}

impl Credentials {
    pub fn disables_password_login(&self) -> bool {
        self.authentication_type == AuthenticationType::Ssh
    }
}

pub fn validate_admin_username(username: &str, os_type: OsType) -> Result<(), DeployError> {
    if username.is_empty() {
        return Err(DeployError::usage("admin user name can not be empty"));
    }

    let (forbidden, bad_edge, message) = match os_type {
        OsType::Linux => (
            &*LINUX_USERNAME_FORBIDDEN,
            username.starts_with(['$', '-']),
            r#"admin user name cannot contain upper case character A-Z, special characters \/"[]:|<>+=;,?*@#()! or start with $ or -"#,
        ),
        OsType::Windows => (
            &*WINDOWS_USERNAME_FORBIDDEN,
            username.ends_with('.'),
            r#"admin user name cannot contain special characters \/"[]:|<>+=;,?*@# or ends with ."#,
        ),
    };
    if forbidden.is_match(username) || bad_edge {
        return Err(DeployError::usage(message));
    }

    if DISALLOWED_USERNAMES.contains(&username.to_lowercase().as_str()) {
        return Err(DeployError::usage(format!(
            "this user name '{username}' meets the general requirements, but is specifically disallowed for this image, please try a different value"
        )));
    }

    Ok(())
}

/// Length within the OS limit and at least three of: lower case, upper case, digit, special.
pub fn validate_admin_password(password: &str, os_type: OsType) -> Result<(), DeployError> {
    let max_length = match os_type {
        OsType::Linux => 72,
        OsType::Windows => 123,
    };

    let classes = [
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        PASSWORD_SPECIAL.is_match(password),
    ];
    let present = classes.into_iter().filter(|present| *present).count();
    let length = password.chars().count();

    if !(PASSWORD_MIN_LENGTH..=max_length).contains(&length) || present < 3 {
        return Err(DeployError::usage(format!(
            "the password length must be between {PASSWORD_MIN_LENGTH} and {max_length}. Password must have the 3 of the following: 1 lower case character, 1 upper case character, 1 number and 1 special character"
        )));
    }

    Ok(())
}

/// Password rules applied while the user types.
#[derive(Debug, Clone, Copy)]
pub struct AdminPasswordValidator {
    os_type: OsType,
}

impl AdminPasswordValidator {
    pub fn new(os_type: OsType) -> Self {
        Self { os_type }
    }
}

impl InputValidator for AdminPasswordValidator {
    fn validate(&self, input: &str) -> Result<InputValidatorResult> {
        match validate_admin_password(input, self.os_type) {
            Ok(()) => Ok(InputValidatorResult::Valid),
            Err(DeployError::Usage(message)) => Ok(InputValidatorResult::Invalid(message)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Decide the authentication type and collect the secrets it needs.
///
/// Returns `None` when the OS disk is attached, since such machines carry no OS profile.
pub async fn resolve_credentials(
    context: &ResolverContext<'_>,
    prompt: &(dyn PasswordPrompt + Send + Sync),
    request: &CreateRequest,
    os_type: OsType,
    specialized: bool,
) -> Result<Option<Credentials>, DeployError> {
    if specialized {
        return Ok(None);
    }

    let admin_username = request
        .admin_username
        .clone()
        .unwrap_or_else(|| DEFAULT_ADMIN_USERNAME.to_string());
    validate_admin_username(&admin_username, os_type)?;

    let has_keys = !request.ssh_key_values.is_empty();
    let authentication_type = request.authentication_type.unwrap_or(
        match (has_keys, request.admin_password.is_some(), os_type) {
            (true, true, _) => AuthenticationType::All,
            (_, true, _) | (_, _, OsType::Windows) => AuthenticationType::Password,
            _ => AuthenticationType::Ssh,
        },
    );

    if os_type == OsType::Windows && authentication_type != AuthenticationType::Password {
        return Err(DeployError::usage(
            "SSH not supported for Windows VMs, use password authentication",
        ));
    }

    let mut credentials = Credentials {
        authentication_type,
        admin_password: None,
        ssh_keys: Vec::new(),
        ssh_dest_key_path: None,
        admin_username,
    };

    match authentication_type {
        AuthenticationType::Password => {
            if has_keys || request.ssh_dest_key_path.is_some() {
                return Err(DeployError::usage(
                    "SSH key cannot be used with password authentication type",
                ));
            }
            credentials.admin_password = Some(admin_password(prompt, request, os_type)?);
        }
        AuthenticationType::Ssh => {
            if request.admin_password.is_some() {
                return Err(DeployError::usage(
                    "admin password cannot be used with SSH authentication type",
                ));
            }
            credentials.ssh_keys = ssh_keys(context, request).await?;
        }
        AuthenticationType::All => {
            credentials.admin_password = Some(admin_password(prompt, request, os_type)?);
            credentials.ssh_keys = ssh_keys(context, request).await?;
        }
    }

    if !credentials.ssh_keys.is_empty() {
        credentials.ssh_dest_key_path = Some(request.ssh_dest_key_path.clone().unwrap_or_else(
            || format!("/home/{}/.ssh/authorized_keys", credentials.admin_username),
        ));
    }

    Ok(Some(credentials))
}

// Validate the given password or ask for one.
fn admin_password(
    prompt: &(dyn PasswordPrompt + Send + Sync),
    request: &CreateRequest,
    os_type: OsType,
) -> Result<Secret, DeployError> {
    if let Some(password) = &request.admin_password {
        validate_admin_password(password.expose(), os_type)?;
        return Ok(password.clone());
    }

    let answer = prompt
        .password(
            PasswordPromptOptions::builder()
                .message("Admin password:")
                .validator(InputPromptValidator::new(AdminPasswordValidator::new(os_type)))
                .help_message(format!(
                    "{PASSWORD_MIN_LENGTH} or more characters with 3 of: lower case, upper case, number, special character"
                ))
                .build(),
        )
        .map_err(|e| DeployError::Prompt(e.context("pass --admin-password to run non-interactively")))?;

    match answer {
        PasswordPromptResult::Password(password) => {
            validate_admin_password(password.expose(), os_type)?;
            Ok(password)
        }
        PasswordPromptResult::Canceled => Err(DeployError::usage(
            "an admin password is required for password authentication",
        )),
    }
}

// Key values may be literal keys or paths to public key files.
async fn ssh_keys(
    context: &ResolverContext<'_>,
    request: &CreateRequest,
) -> Result<Vec<String>, DeployError> {
    let values = if request.ssh_key_values.is_empty() {
        let default_key = default_public_key_path().ok_or_else(|| {
            DeployError::usage("an SSH public key must be supplied with --ssh-key-values")
        })?;
        vec![default_key.to_string_lossy().into_owned()]
    } else {
        request.ssh_key_values.clone()
    };

    let mut keys = Vec::with_capacity(values.len());
    for value in values {
        let path = Path::new(&value);
        let key = if context.files.is_file(path).await {
            info!(path = %path.display(), "using existing SSH public key file");
            context
                .files
                .read_to_string(path)
                .await
                .map_err(|e| DeployError::usage(format!("{e:#}")))?
                .trim()
                .to_string()
        } else {
            value.trim().to_string()
        };

        if !SSH_KEY_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
            return Err(DeployError::usage(format!(
                "'{value}' is neither an SSH public key file nor a valid public key (ssh-rsa, ssh-ed25519 or ecdsa-sha2-*)"
            )));
        }
        keys.push(key);
    }

    Ok(keys)
}

fn default_public_key_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".ssh").join("id_rsa.pub"))
}
