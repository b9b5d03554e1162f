//! Confirmation gate before any destroy call goes out.

use std::io::{BufRead, Write};

use tracing::{info, warn};

/// Ask the user to confirm deletion by reading one line from `input`.
///
/// Only a trimmed, case-insensitive `yes` confirms. Read errors decline
/// (fail closed).
pub fn user_confirmed_deletion(input: &mut dyn BufRead) -> bool {
    info!(
        "Are you sure you want to delete these resources (cannot be undone)? \
         Only 'yes' will be accepted."
    );
    print!("{:>23}", "Enter a value: ");
    let _ = std::io::stdout().flush();

    let mut response = String::new();
    match input.read_line(&mut response) {
        Ok(_) => response.trim().eq_ignore_ascii_case("yes"),
        Err(e) => {
            warn!(error = %e, "failed to read confirmation input");
            false
        }
    }
}
