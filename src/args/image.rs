use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Image {
    /// List image aliases, or every marketplace image with --all.
    #[command(alias = "ls")]
    List(ImageList),
    /// Show one marketplace image version.
    Show(ImageShow),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ImageList {
    /// Location to list images in, required with --all.
    #[arg(long, short = 'l')]
    pub location: Option<String>,

    /// Walk the whole marketplace instead of listing aliases. This takes a while.
    #[arg(long)]
    pub all: bool,

    /// Publisher filter, case-insensitive substring.
    #[arg(long, short = 'p')]
    pub publisher: Option<String>,

    /// Offer filter, case-insensitive substring.
    #[arg(long, short = 'f')]
    pub offer: Option<String>,

    /// Sku filter, case-insensitive substring.
    #[arg(long, short = 's')]
    pub sku: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ImageShow {
    /// Location of the image.
    #[arg(long, short = 'l')]
    pub location: String,

    /// Image URN: publisher:offer:sku:version.
    #[arg(long)]
    pub urn: Option<String>,

    /// Image publisher.
    #[arg(long, short = 'p')]
    pub publisher: Option<String>,

    /// Image offer.
    #[arg(long, short = 'f')]
    pub offer: Option<String>,

    /// Image sku.
    #[arg(long, short = 's')]
    pub sku: Option<String>,

    /// Image version, or latest.
    #[arg(long)]
    pub version: Option<String>,
}
