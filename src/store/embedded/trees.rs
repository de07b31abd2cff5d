pub const FLASHCARDS: &str = "flashcards";
pub const PRESET_DOMAINS: &str = "preset_domains";
pub const META: &str = "meta";

// Secondary index trees
pub const FLASHCARDS_BY_CREATED_AT: &str = "flashcards_by_created_at";
pub const PRESET_DOMAIN_NAMES: &str = "preset_domain_names";
