//! CLI argument parsing layer.
//!
//! This module provides the CLI interface using clap derive macros.
//! It handles parsing command-line arguments and converting them into structured data types.
//!
//! The business logic layer is [`crate::commands`], which receives these parsed arguments.

use clap::Subcommand;

mod cli;
mod create;
mod image;
mod vm;
mod vmss;

pub use cli::{Cli, GlobalArgs};
pub use create::CreateArgs;
pub use image::{Image, ImageList, ImageShow};
pub use vm::{Vm, VmCreate};
pub use vmss::{Vmss, VmssCreate};

/// Root command enum.
#[derive(Subcommand)]
pub enum Command {
    /// Manage virtual machines.
    #[command(subcommand)]
    Vm(Vm),
    /// Manage virtual machine scale sets.
    #[command(subcommand)]
    Vmss(Vmss),
    /// Browse marketplace images.
    #[command(subcommand)]
    Image(Image),
}
