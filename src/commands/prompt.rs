use async_trait::async_trait;
use slotwatch::parser::Choice;
use slotwatch::resolver::Chooser;
use slotwatch::ResourceKind;
use std::io::{self, BufRead, Write};
use tokio::sync::Mutex;

/// Asks on the terminal which candidate to use
///
/// Prompts from several accounts are serialized so their questions do not
/// interleave.
#[derive(Default)]
pub struct StdinChooser {
    lock: Mutex<()>,
}

#[async_trait]
impl Chooser for StdinChooser {
    async fn choose(&self, kind: ResourceKind, candidates: &[Choice]) -> Option<String> {
        let _guard = self.lock.lock().await;

        let mut prompt = format!("Several {kind} candidates:\n");
        for choice in candidates {
            prompt.push_str(&format!("  {:>6}  {}\n", choice.id, choice.label));
        }
        prompt.push_str("Enter id (empty to abort): ");

        tokio::task::spawn_blocking(move || {
            let mut stdout = io::stdout();
            stdout.write_all(prompt.as_bytes()).ok()?;
            stdout.flush().ok()?;

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).ok()?;
            let answer = line.trim();
            (!answer.is_empty()).then(|| answer.to_string())
        })
        .await
        .ok()
        .flatten()
    }
}
