use anyhow::{Context, Result};
use overseer_state::CancelToken;

/// A token that is cancelled when the process receives an interrupt.
pub(crate) fn set_up_process_interrupt_handler() -> Result<CancelToken> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .context("setting interrupt handler")?;
    Ok(token)
}
