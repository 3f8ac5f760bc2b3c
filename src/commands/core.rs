//! Core command traits.
//!
//! Every operation implements [`CommandWithOutput`] and returns a typed result.
//! [`CommandWithOutputExt::with_print_to_stdout`] wraps it into a [`Command`] that renders the
//! result in the requested [`Format`] once the operation finishes.
use std::io::{self, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::formatting::{Format, Formattable};

/// A unit of work run by `main`.
#[async_trait]
pub trait Command {
    async fn execute(&mut self) -> Result<()>;
}

/// An operation producing a result that still has to be rendered.
#[async_trait]
pub trait CommandWithOutput {
    type Output;

    async fn execute(&mut self) -> Result<Self::Output>;
}

pub trait CommandWithOutputExt {
    /// Print the result to stdout in `format` after the operation succeeds.
    ///
    /// Nothing is printed when the operation fails; the error is returned instead.
    fn with_print_to_stdout(self, format: Format) -> Result<Box<dyn Command>>;
}

/// Runs a [`CommandWithOutput`] and writes its rendered result.
pub struct PrintOutput<C> {
    command: C,
    format: Format,
    writer: Box<dyn Write + Send>,
}

impl<C> PrintOutput<C> {
    pub fn new(command: C, format: Format, writer: Box<dyn Write + Send>) -> Self {
        Self {
            command,
            format,
            writer,
        }
    }
}

#[async_trait]
impl<C> Command for PrintOutput<C>
where
    C: CommandWithOutput + Send,
    C::Output: Formattable,
{
    async fn execute(&mut self) -> Result<()> {
        let output = self.command.execute().await?;
        let rendered = output.format(self.format)?;

        // a closed pipe (`vmforge image list --all | head`) surfaces as an error here
        writeln!(self.writer, "{rendered}").context("writing command output")?;
        self.writer.flush().context("writing command output")
    }
}

impl<C> CommandWithOutputExt for C
where
    C: CommandWithOutput + Send + 'static,
    C::Output: Formattable,
{
    fn with_print_to_stdout(self, format: Format) -> Result<Box<dyn Command>> {
        Ok(Box::new(PrintOutput::new(self, format, Box::new(io::stdout()))))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fmt::Display,
        sync::{Arc, Mutex},
    };

    use anyhow::anyhow;
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Deployed {
        name: String,
    }

    impl Display for Deployed {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "Virtual machine '{}' created", self.name)
        }
    }

    struct FakeCreate {
        fail: bool,
    }

    #[async_trait]
    impl CommandWithOutput for FakeCreate {
        type Output = Deployed;

        async fn execute(&mut self) -> Result<Self::Output> {
            if self.fail {
                return Err(anyhow!("deployment 'vm_deploy_1' was rejected"));
            }
            Ok(Deployed {
                name: "web1".to_string(),
            })
        }
    }

    /// Writer whose contents stay readable after it is boxed.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_text_output_is_written_with_newline() {
        let captured = Captured::default();
        let mut command = PrintOutput::new(
            FakeCreate { fail: false },
            Format::Text,
            Box::new(captured.clone()),
        );

        command.execute().await.unwrap();

        assert_eq!(captured.contents(), "Virtual machine 'web1' created\n");
    }

    #[tokio::test]
    async fn test_json_output() {
        let captured = Captured::default();
        let mut command = PrintOutput::new(
            FakeCreate { fail: false },
            Format::Json,
            Box::new(captured.clone()),
        );

        command.execute().await.unwrap();

        assert_eq!(captured.contents(), "{\n  \"name\": \"web1\"\n}\n");
    }

    #[tokio::test]
    async fn test_failed_command_prints_nothing() {
        let captured = Captured::default();
        let mut command = PrintOutput::new(
            FakeCreate { fail: true },
            Format::Text,
            Box::new(captured.clone()),
        );

        let error = command.execute().await.unwrap_err();

        assert_eq!(error.to_string(), "deployment 'vm_deploy_1' was rejected");
        assert!(captured.contents().is_empty());
    }
}
