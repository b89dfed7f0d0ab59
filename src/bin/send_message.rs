use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use lvsync::args::{self, CommonArgs, Session};
use lvsync::backend::{Backend, RecipientKind};
use lvsync::messages;

/// Sends a message through the website to one recipient found by name,
/// or lists the inbox.
#[derive(Parser, Debug)]
#[command(name = "lvs-send-message")]
struct Cli {
    /// Name (or part of the name) of the recipient. The search must
    /// match exactly one person.
    #[arg(value_name = "RECIPIENT", required_unless_present = "inbox")]
    recipient: Option<String>,

    /// The type of recipient to search for: staff, teacher, student or
    /// parent.
    #[arg(long = "to-type", value_name = "TYPE", default_value = "student")]
    to_type: String,

    /// Message subject. Prompted for when missing.
    #[arg(short, long)]
    subject: Option<String>,

    /// Message body. Prompted for when missing.
    #[arg(short, long)]
    body: Option<String>,

    /// Read the message body from a text file.
    #[arg(long = "body-file", conflicts_with = "body", value_name = "FILE")]
    body_file: Option<PathBuf>,

    /// List the inbox instead of sending a message.
    #[arg(long)]
    inbox: bool,

    #[command(flatten)]
    common: CommonArgs,
}

fn send_message(cli: &Cli, session: &Session, backend: &mut dyn Backend) -> Result<()> {
    let ui = session.ui.as_ref();
    if cli.inbox {
        let mails = backend.inbox()?;
        println!("Nb of mails: {}", mails.len());
        print!("{}", messages::render_inbox(&mails));
        return Ok(());
    }
    let recipient = cli.recipient.clone()
        .ok_or_else(|| anyhow!("no recipient provided"))?;
    let kind: RecipientKind = cli.to_type.parse()?;
    let subject = match &cli.subject {
        Some(s) => s.clone(),
        None => ui.text("Subject:")?,
    };
    let body = match &cli.body_file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|_| anyhow!("could not read body file {}", path.display()))?,
        None => match &cli.body {
            Some(b) => b.clone(),
            None => ui.text("Message body:")?,
        },
    };
    let go = ui.confirm_yn(&format!("Send the message to \"{}\" ({})?", recipient, cli.to_type))?;
    if !go {
        println!("Aborting.");
        return Ok(());
    }
    backend.send_message(&recipient, kind, &subject, &body)?;
    println!("Message sent.");
    Ok(())
}

fn main() {
    args::run_tool(|| {
        let cli = Cli::parse();
        let session = args::resolve(&cli.common)?;
        let mut backend = args::open_backend(&session, &cli.common)?;
        let result = send_message(&cli, &session, backend.as_mut());
        backend.close();
        session.ui.message("Done.");
        result
    });
}
