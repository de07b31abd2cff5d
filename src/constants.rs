/// 不熟（mastery=1）复习间隔（小时）
pub const UNFAMILIAR_INTERVAL_HOURS: i64 = 4;

/// 一般（mastery=2）复习间隔（小时）
pub const FAMILIAR_INTERVAL_HOURS: i64 = 24;

/// 熟练（mastery=3）复习间隔（小时）
pub const MASTERED_INTERVAL_HOURS: i64 = 7 * 24;

/// 每日复习默认抽取卡片数
pub const DEFAULT_DAILY_LIMIT: usize = 10;

/// 每日复习单次最大抽取卡片数
pub const MAX_DAILY_LIMIT: usize = 100;

/// 未指定领域时使用的默认领域
pub const DEFAULT_DOMAIN: &str = "通用";

/// 首次初始化时创建的预设领域
pub const INITIAL_PRESET_DOMAINS: &[&str] = &["通用", "心理学", "DSM", "GIS", "LLM"];

/// 领域名称最大长度（字符）
pub const MAX_DOMAIN_NAME_CHARS: usize = 100;

/// 导出文件名
pub const EXPORT_FILE_NAME: &str = "flashcards-export.json";

/// 拆词：最短单词长度
pub const MIN_SPLIT_WORD_LEN: usize = 2;

/// 拆词：最长单词长度
pub const MAX_SPLIT_WORD_LEN: usize = 30;

/// 整库备份文件名
pub const BACKUP_FILE_NAME: &str = "flashcards-backup.json";
