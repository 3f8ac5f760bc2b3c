use std::rc::Rc;

use anyhow::Result;
use typed_builder::TypedBuilder;

use crate::models::Secret;

mod input;
mod spinner;

#[derive(Debug, Default, Clone)]
pub struct Interaction;

impl Interaction {
    pub fn new() -> Self {
        Default::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct ConfirmationPromptOptions {
    #[builder(setter(into))]
    message: String,
    #[builder(default, setter(strip_option))]
    default: Option<bool>,
    #[builder(default, setter(strip_option))]
    pre_confirmation_help_text: Option<String>,
}

impl ConfirmationPromptOptions {
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPromptResult {
    Yes,
    No,
    Canceled,
}

pub trait ConfirmationPrompt {
    fn confirm(&self, options: ConfirmationPromptOptions) -> Result<ConfirmationPromptResult>;
}

#[derive(TypedBuilder)]
pub struct PasswordPromptOptions {
    #[builder(setter(into))]
    pub message: String,
    #[builder(default, setter(strip_option))]
    pub validator: Option<InputPromptValidator>,
    #[builder(default, setter(strip_option))]
    pub help_message: Option<String>,
}

#[derive(Clone)]
// Rc keeps the validator cloneable, which the prompt library requires
pub struct InputPromptValidator(Rc<dyn InputValidator>);

impl InputPromptValidator {
    pub fn new(validator: impl InputValidator + 'static) -> Self {
        Self(Rc::new(validator))
    }
}

pub trait InputValidator {
    fn validate(&self, input: &str) -> Result<InputValidatorResult>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputValidatorResult {
    Valid,
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordPromptResult {
    Password(Secret),
    Canceled,
}

pub trait PasswordPrompt {
    /// Ask for a secret twice, validating the first answer.
    fn password(&self, options: PasswordPromptOptions) -> Result<PasswordPromptResult>;
}

pub struct SpinnerHandle {
    stop_spinner: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SpinnerHandle {
    pub fn new(stop_spinner: Box<dyn FnOnce() + Send + Sync>) -> Self {
        Self {
            stop_spinner: Some(stop_spinner),
        }
    }
}

impl Drop for SpinnerHandle {
    fn drop(&mut self) {
        if let Some(stop_spinner) = self.stop_spinner.take() {
            stop_spinner();
        }
    }
}

pub trait SpinnerInteraction {
    fn start_spinner(&self, message: String) -> Result<SpinnerHandle>;
}
