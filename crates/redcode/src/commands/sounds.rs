//! `sounds`: show which clip each category plays on this station.

use serde::Serialize;
use tabled::Tabled;

use redcode_core::{AlertCategory, SoundResolver};

use crate::cli::GlobalOpts;
use crate::config::{self, Config};
use crate::output;

#[derive(Debug, Clone, Serialize, Tabled)]
struct SoundEntry {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Palette")]
    palette: String,
    #[tabled(rename = "Clip")]
    clip: String,
}

/// Known categories first, then custom codes, then the fallback.
fn entries(sounds: &SoundResolver, receiver_clip: Option<&str>) -> Vec<SoundEntry> {
    let mut out: Vec<SoundEntry> = AlertCategory::KNOWN
        .iter()
        .map(|category| SoundEntry {
            category: category.code().to_owned(),
            palette: category.palette().to_string(),
            clip: sounds.resolve(category).to_owned(),
        })
        .collect();

    for (code, clip) in sounds.entries() {
        if out.iter().any(|e| e.category == code) {
            continue;
        }
        let category = AlertCategory::from_code(code);
        out.push(SoundEntry {
            category: code.to_owned(),
            palette: category.palette().to_string(),
            clip: clip.to_owned(),
        });
    }

    out.push(SoundEntry {
        category: "(other)".into(),
        palette: String::new(),
        clip: sounds.default_locator().to_owned(),
    });
    if let Some(clip) = receiver_clip {
        out.push(SoundEntry {
            category: "(receiver)".into(),
            palette: String::new(),
            clip: clip.to_owned(),
        });
    }
    out
}

pub fn handle(config: &Config, global: &GlobalOpts) {
    // Without a station profile, show the stock table.
    let station = config::resolve_station(global, config, None).ok();
    let (sounds, receiver_clip) = match station {
        Some(ref s) => (s.sounds.clone(), s.receiver.clip.as_deref()),
        None => (SoundResolver::default(), None),
    };

    let rows = entries(&sounds, receiver_clip);
    let out = output::render_list(
        &global.output,
        &rows,
        SoundEntry::clone,
        |e| format!("{}\t{}", e.category, e.clip),
    );
    output::print_output(&out, global.quiet);
}
