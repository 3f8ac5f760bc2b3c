use anyhow::Result;
use inquire::{Confirm, InquireError, Password, PasswordDisplayMode, validator::StringValidator};

use super::{
    ConfirmationPrompt, ConfirmationPromptOptions, ConfirmationPromptResult, InputPromptValidator,
    InputValidatorResult, Interaction, PasswordPrompt, PasswordPromptOptions, PasswordPromptResult,
};
use crate::models::Secret;

impl ConfirmationPrompt for Interaction {
    fn confirm(&self, options: ConfirmationPromptOptions) -> Result<ConfirmationPromptResult> {
        let mut prompt = Confirm::new(&options.message);
        if let Some(default) = options.default {
            prompt = prompt.with_default(default);
        }

        if let Some(help_text) = &options.pre_confirmation_help_text {
            eprintln!("{}", help_text);
        }

        match prompt.prompt() {
            Ok(true) => Ok(ConfirmationPromptResult::Yes),
            Ok(false) => Ok(ConfirmationPromptResult::No),
            Err(InquireError::OperationCanceled) => Ok(ConfirmationPromptResult::Canceled),
            Err(InquireError::OperationInterrupted) => Ok(ConfirmationPromptResult::Canceled),
            Err(err) => Err(anyhow::anyhow!("error prompting for confirmation: {}", err)),
        }
    }
}

impl StringValidator for InputPromptValidator {
    fn validate(
        &self,
        input: &str,
    ) -> Result<inquire::validator::Validation, inquire::error::CustomUserError> {
        match self.0.validate(input) {
            Ok(InputValidatorResult::Valid) => Ok(inquire::validator::Validation::Valid),
            Ok(InputValidatorResult::Invalid(error)) => {
                Ok(inquire::validator::Validation::Invalid(
                    inquire::validator::ErrorMessage::Custom(error),
                ))
            }
            Err(e) => Err(inquire::error::CustomUserError::from(e)),
        }
    }
}

impl PasswordPrompt for Interaction {
    fn password(&self, options: PasswordPromptOptions) -> Result<PasswordPromptResult> {
        let confirmation_message = format!("Confirm {}", options.message.to_lowercase());
        let mut prompt = Password::new(&options.message)
            .with_display_mode(PasswordDisplayMode::Masked)
            .with_custom_confirmation_message(&confirmation_message);

        if let Some(help_message) = &options.help_message {
            prompt = prompt.with_help_message(help_message);
        }

        if let Some(validator) = options.validator {
            prompt = prompt.with_validator(validator);
        }

        match prompt.prompt() {
            Ok(password) => Ok(PasswordPromptResult::Password(Secret::new(password))),
            Err(InquireError::OperationCanceled) => Ok(PasswordPromptResult::Canceled),
            Err(InquireError::OperationInterrupted) => Ok(PasswordPromptResult::Canceled),
            Err(err) => Err(anyhow::anyhow!("error prompting for password: {}", err)),
        }
    }
}
