use serde::Deserialize;

use quarry_core::models::Document;

use crate::load_fixture;

const FILLER: &[&str] = &[
    "river", "stone", "lantern", "harbor", "meadow", "copper", "signal", "orchard", "glacier",
    "thread", "canvas", "ember", "quarry", "falcon", "ledger", "prism",
];

/// `n` documents `doc-000`…; every `marker_every`-th one also contains
/// `marker`. Text is deterministic.
pub fn generate_corpus(n: usize, marker: &str, marker_every: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            let mut words: Vec<&str> = (0..12).map(|j| FILLER[(i * 5 + j * 7) % FILLER.len()]).collect();
            if marker_every > 0 && i % marker_every == 0 {
                words.push(marker);
            }
            Document::new(format!("doc-{i:03}"), "corpus", words.join(" "))
        })
        .collect()
}

#[derive(Deserialize)]
struct CorpusFile {
    documents: Vec<Document>,
}

/// Load `corpus/<name>.json`.
pub fn load_corpus(name: &str) -> Vec<Document> {
    load_fixture::<CorpusFile>(&format!("corpus/{name}.json")).documents
}
