//! Operator confirmation seam.
//!
//! Operations that pause for a yes/no answer take a [`Confirmer`] rather
//! than reading stdin directly, so the binary wires in the interactive
//! prompt while tests script the answer.

use std::io::BufRead;

/// Answers yes/no questions on behalf of the operator.
pub trait Confirmer {
    /// `true` to continue with the operation, `false` to abort.
    fn confirm(&mut self) -> bool;
}

/// Always answers yes. Used when confirmation was disabled on the command
/// line.
pub struct Assent;

impl Confirmer for Assent {
    fn confirm(&mut self) -> bool {
        true
    }
}

/// A fixed answer, for scripted flows and tests.
pub struct Scripted(pub bool);

impl Confirmer for Scripted {
    fn confirm(&mut self) -> bool {
        self.0
    }
}

/// Interactive prompt on stdin: accepts `y`/`yes`/`n`/`no`
/// (case-insensitive), reprompts up to `retries` times on anything else,
/// then declines.
pub struct StdinConfirmer {
    retries: u32,
}

impl StdinConfirmer {
    pub fn new() -> Self {
        StdinConfirmer { retries: 3 }
    }
}

impl Default for StdinConfirmer {
    fn default() -> Self {
        Self::new()
    }
}

impl Confirmer for StdinConfirmer {
    fn confirm(&mut self) -> bool {
        println!("Please type (y)es or (n)o and Enter to continue with the operation:");
        let stdin = std::io::stdin();
        confirm_from(&mut stdin.lock(), self.retries)
    }
}

fn confirm_from<R: BufRead>(reader: &mut R, retries: u32) -> bool {
    let mut attempts = 0;
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return true,
            "n" | "no" => return false,
            _ => {
                attempts += 1;
                if attempts >= retries {
                    println!("reached maximum retries: {retries}");
                    return false;
                }
                println!(
                    "I'm sorry but I didn't get what you meant, please type (y)es or (n)o and then press enter:"
                );
            }
        }
    }
}
