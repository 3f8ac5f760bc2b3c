//! This module contains business logic for the commands for the application.
//!
//! The main entry point is the [`command_from_args`] function which converts CLI arguments into a command.
use anyhow::Result;

use crate::{
    args::{self, Image, Vm, Vmss},
    config::Settings,
    formatting::Format,
};
pub use core::{Command, CommandWithOutput, CommandWithOutputExt};

mod core;
pub mod create;
pub mod image;

/// Convert CLI arguments into a command.
///
/// This function is the main entry point for the command execution logic.
/// It converts the CLI arguments into a command and returns it.
///
/// The output of the command will be formatted using the provided format and printed to stdout.
pub async fn command_from_args(
    command: args::Command,
    settings: &Settings,
    format: Format,
) -> Result<Box<dyn Command>> {
    match command {
        args::Command::Vm(Vm::Create(create_args)) => {
            create::Create::vm(create_args, settings).with_print_to_stdout(format)
        }
        args::Command::Vmss(Vmss::Create(create_args)) => {
            create::Create::vmss(create_args, settings).with_print_to_stdout(format)
        }
        args::Command::Image(Image::List(list_args)) => {
            image::list::List::new(list_args, settings).with_print_to_stdout(format)
        }
        args::Command::Image(Image::Show(show_args)) => {
            image::show::Show::new(show_args, settings)?.with_print_to_stdout(format)
        }
    }
}
