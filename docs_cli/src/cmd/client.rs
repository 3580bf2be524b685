use std::io::Write;

use anyhow::{Context, Result};
use docs_client::Client;
use tracing::debug;

use crate::ClientCmd;
use crate::helpers::parse_edit;

/// Prints `text`, adding a final newline when it has none.
fn print_block(text: &str) {
    if text.ends_with('\n') || text.is_empty() {
        print!("{text}");
    } else {
        println!("{text}");
    }
}

pub async fn run_client(addr: &str, user: &str, cmd: ClientCmd) -> Result<()> {
    let mut client = Client::connect(addr, user)
        .await
        .with_context(|| format!("connecting to name server at {addr} as '{user}'"))?;

    let output = match cmd {
        ClientCmd::Create { file } => client.create(&file).await?,
        ClientCmd::Read { file } => client.read(&file).await?,
        ClientCmd::Stream { file } => {
            let mut stdout = std::io::stdout();
            let mut first = true;
            client
                .stream(&file, |word| {
                    let sep = if first { "" } else { " " };
                    first = false;
                    let _ = write!(stdout, "{sep}{word}");
                    let _ = stdout.flush();
                })
                .await?;
            if first { String::new() } else { "\n".to_owned() }
        }
        ClientCmd::Write {
            file,
            sentence,
            edits,
        } => {
            let mut session = client.write(&file, sentence).await?;
            debug!("{}", session.sentence());
            for edit in &edits {
                let (index, word) = parse_edit(edit)?;
                let text = session.edit(index, word).await?;
                debug!("{text}");
            }
            session.commit().await?
        }
        ClientCmd::Delete { file } => client.delete(&file).await?,
        ClientCmd::Info { file } => client.info(&file).await?,
        ClientCmd::View { all, long } => client.view(all, long).await?,
        ClientCmd::List => client.list_users().await?,
        ClientCmd::Undo { file } => client.undo(&file).await?,
        ClientCmd::Exec { file } => client.exec(&file).await?,
        ClientCmd::AddAccess { file, user, write } => {
            client.add_access(&file, &user, write).await?
        }
        ClientCmd::RemAccess { file, user } => client.rem_access(&file, &user).await?,
    };
    print_block(&output);
    Ok(())
}
