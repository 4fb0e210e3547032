use core::hash::BuildHasherDefault;
use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use seahash::SeaHasher;

pub type FastHasher = BuildHasherDefault<SeaHasher>;

lazy_static! {
    static ref BORING_KEYWORD: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
    static ref RESERVED_WORDS: HashSet<&'static str> = "abort action add after all alter \
        analyze and as asc attach autoincrement before begin between by cascade case cast \
        check collate column commit conflict constraint create cross current_date \
        current_time current_timestamp database default deferrable deferred delete desc \
        detach distinct drop each else end escape except exclusive exists explain fail for \
        foreign from full glob group having if ignore immediate in index indexed initially \
        inner insert instead intersect into is isnull join key left like limit match natural \
        no not notnull null of offset on or order outer plan pragma primary query raise \
        recursive references regexp reindex release rename replace restrict right rollback \
        row savepoint select set table temp temporary then to transaction trigger union \
        unique update using vacuum values view virtual when where with without"
        .split_whitespace()
        .collect();
}

/// Quotes an identifier with square brackets unless it is a plain,
/// non-reserved word.
pub fn escape_sqlite(identifier: &str) -> String {
    if BORING_KEYWORD.is_match(identifier)
        && !RESERVED_WORDS.contains(identifier.to_lowercase().as_str())
    {
        identifier.to_string()
    } else {
        format!("[{identifier}]")
    }
}

/// The base query for a whole table.
pub fn select_all_from(table: &str) -> String {
    format!("select * from {}", escape_sqlite(table))
}
