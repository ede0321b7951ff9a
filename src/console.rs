//! Interactive operator prompt.
//!
//! A single-threaded read-eval loop: every command runs to completion before
//! the next prompt is shown, so restarts never overlap. Unknown input prints
//! the usage line and changes nothing.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::controller::Controller;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Restart,
    Kill,
    Attach,
    Exit,
}

/// Parse an operator line: case-insensitive, surrounding whitespace ignored.
pub fn parse_command(input: &str) -> Option<Command> {
    match input.trim().to_lowercase().as_str() {
        "restart" => Some(Command::Restart),
        "kill" => Some(Command::Kill),
        "attach" => Some(Command::Attach),
        "exit" | "quit" => Some(Command::Exit),
        _ => None,
    }
}

const USAGE: &str = "commands: restart (interrupt and relaunch), kill (tear down and quit), \
                     attach (view the session), exit (leave the cluster running)";

/// Run the prompt until `kill` or `exit`. EOF on stdin behaves like `exit`.
pub async fn run(controller: &mut Controller) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("muster> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match parse_command(&line) {
            Some(Command::Restart) => {
                if let Err(err) = controller.restart().await {
                    eprintln!("restart failed: {err:#} (cluster is {})", controller.phase());
                }
            }
            Some(Command::Kill) => {
                controller.kill_all().await;
                break;
            }
            Some(Command::Attach) => controller.attach().await,
            Some(Command::Exit) => {
                println!(
                    "leaving the cluster running; attach with: tmux attach-session -t {}",
                    controller.session_name()
                );
                break;
            }
            None => println!("{USAGE}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_case_insensitively() {
        assert_eq!(parse_command("restart"), Some(Command::Restart));
        assert_eq!(parse_command("ReStArT"), Some(Command::Restart));
        assert_eq!(parse_command("KILL"), Some(Command::Kill));
        assert_eq!(parse_command("Attach"), Some(Command::Attach));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(parse_command("  kill  "), Some(Command::Kill));
        assert_eq!(parse_command("\trestart\n"), Some(Command::Restart));
    }

    #[test]
    fn exit_and_quit_are_synonyms() {
        assert_eq!(parse_command("exit"), Some(Command::Exit));
        assert_eq!(parse_command("quit"), Some(Command::Exit));
    }

    #[test]
    fn anything_else_is_rejected() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("restar"), None);
        assert_eq!(parse_command("kill all"), None);
        assert_eq!(parse_command("help"), None);
    }
}
