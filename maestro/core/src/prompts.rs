//! Prompt templates
//!
//! Builds the chat messages for a fresh composition or a refinement turn.

use crate::backend::ChatMessage;
use crate::catalog::{self, CatalogKey};

/// System prompt for a fresh composition
///
/// With a pinned bank the model is restricted to it. Without one, the model
/// is asked to pick a bank and announce it as its first output line.
#[must_use]
pub fn system_prompt(pinned: Option<CatalogKey>) -> String {
    let (bank_section, instrument_list) = match pinned {
        Some(key) => {
            let bank = key.bank();
            (
                format!(
                    "Instrument Bank: {}\n\
                     Style: {}\n\
                     IMPORTANT: Only use instruments from this bank. Do not suggest switching banks.\n\n",
                    bank.name, bank.description
                ),
                bank.instrument_list(),
            )
        }
        None => {
            let options = CatalogKey::ALL
                .iter()
                .map(|key| {
                    let bank = key.bank();
                    format!("- {key}: {} - {}", bank.name, bank.description)
                })
                .collect::<Vec<_>>()
                .join("\n");
            (
                format!(
                    "No instrument bank specified. Choose one that best fits the requested style.\n\
                     Available banks:\n\
                     {options}\n\n\
                     IMPORTANT: Your FIRST line of output MUST be: {{\"bank\": \"<bank_id>\"}}\n\
                     Then output note events. Example first line: {{\"bank\": \"electronic\"}}\n\n"
                ),
                // The default bank stands in as the example layout
                catalog::resolve(None).instrument_list(),
            )
        }
    };

    format!(
        "You are a music composer generating MIDI sequences with multiple instruments.\n\
         \n\
         {bank_section}Output format: JSON note events, one per line for streaming.\n\
         Each event: {{\"t\": <time_ms>, \"n\": <note_0-127>, \"v\": <velocity_1-127>, \"d\": <duration_ms>, \"i\": <instrument_id>}}\n\
         \n\
         Available instruments:\n\
         {instrument_list}\n\
         \n\
         Guidelines:\n\
         - Output ONLY valid JSON (bank selection if needed, then note events), one per line\n\
         - Choose 2-4 instruments that match the requested style/mood\n\
         - Keep each instrument within its optimal pitch range\n\
         - Bass (i=1): notes 24-48, foundation\n\
         - Melody (i=0,3): notes 60-84, prominence\n\
         - Pads/strings (i=2,4): notes 48-72, harmonic support\n\
         - Vary velocity for dynamics (soft: 40-60, medium: 70-90, loud: 100-127)\n\
         - Generate at least 200-500 notes for a complete piece\n\
         \n\
         Example:\n\
         {{\"t\": 0, \"n\": 36, \"v\": 70, \"d\": 2000, \"i\": 1}}\n\
         {{\"t\": 0, \"n\": 60, \"v\": 65, \"d\": 1500, \"i\": 4}}\n\
         {{\"t\": 500, \"n\": 72, \"v\": 85, \"d\": 500, \"i\": 0}}"
    )
}

/// System prompt for adding to a composition that ends at `end_time` ms
#[must_use]
pub fn refinement_prompt(key: CatalogKey, end_time: u64) -> String {
    let bank = key.bank();
    format!(
        "You are ADDING to an existing MIDI sequence with multiple instruments.\n\
         The existing sequence ends at time {end_time}ms.\n\
         Instrument bank: {} ({})\n\
         \n\
         - Start your new notes AFTER the existing sequence (t > {end_time})\n\
         - Continue the musical style, key, and instrumentation\n\
         - Use the same instruments (i field) as the existing composition\n\
         - Output ONLY new note events as JSON, one per line\n\
         - Generate at least 30-50 new notes\n\
         \n\
         Available instruments: {}",
        bank.name,
        bank.description,
        bank.instrument_summary()
    )
}

/// Messages for a fresh composition
#[must_use]
pub fn fresh_messages(prompt: &str, pinned: Option<CatalogKey>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(pinned)),
        ChatMessage::user(format!("Compose: {prompt}")),
    ]
}

/// Messages for a refinement turn
#[must_use]
pub fn refine_messages(
    original_prompt: &str,
    addition: &str,
    key: CatalogKey,
    end_time: u64,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(refinement_prompt(key, end_time)),
        ChatMessage::user(format!("The existing composition is: {original_prompt}")),
        ChatMessage::user(format!("Add to the composition: {addition}")),
    ]
}
