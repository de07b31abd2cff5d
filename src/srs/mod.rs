pub mod scheduler;
pub mod selector;
pub mod stats;
pub mod types;
pub mod word_splitter;

pub use types::{
    CardSnapshot, CreateFlashcard, Flashcard, FlashcardPatch, InvalidMastery, Mastery,
    PresetDomain, StatsOverview,
};
