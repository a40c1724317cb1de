//! Keyword-based query intent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

// English keywords match whole words only, so names and longer words
// ("Findlay", "classroom", "somewhere") do not count.
static LOCATION_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(where|offices?|located|location|extensions?|phone|find)\b").unwrap()
});

static COURSE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(courses?|class|classes|teach|teaches|teaching|taught|lectures?|subjects?)\b",
    )
    .unwrap()
});

// CJK text has no word breaks; these match anywhere.
const LOCATION_CJK: &[&str] = &["哪", "辦公室", "研究室", "分機"];

const COURSE_CJK: &[&str] = &["課"];

/// Which record fields a query is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// Office location and extension.
    Office,
    /// The course list.
    Courses,
    /// Neither or both.
    General,
}

impl QueryIntent {
    /// Detect intent from keyword presence in the raw query.
    pub fn detect(raw_query: &str) -> Self {
        let location = LOCATION_WORDS.is_match(raw_query)
            || LOCATION_CJK.iter().any(|k| raw_query.contains(k));
        let courses = COURSE_WORDS.is_match(raw_query)
            || COURSE_CJK.iter().any(|k| raw_query.contains(k));
        match (location, courses) {
            (true, false) => QueryIntent::Office,
            (false, true) => QueryIntent::Courses,
            _ => QueryIntent::General,
        }
    }

    /// Short instruction naming the fields to emphasise.
    pub fn focus(&self) -> &'static str {
        match self {
            QueryIntent::Office => {
                "The user wants to know where to find this person: lead with the office \
                 location and extension, and leave out the course list."
            }
            QueryIntent::Courses => {
                "The user is asking about teaching: list every course, one by one."
            }
            QueryIntent::General => {
                "The user wants a general overview: give the office, the extension and \
                 the courses briefly."
            }
        }
    }

    /// One-clause version of [`QueryIntent::focus`] for compact prompts.
    pub fn brief_focus(&self) -> &'static str {
        match self {
            QueryIntent::Office => "Give only the office and extension.",
            QueryIntent::Courses => "List each course separately.",
            QueryIntent::General => "Summarise in one or two sentences.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_keywords() {
        assert_eq!(QueryIntent::detect("Where is Lin Hao?"), QueryIntent::Office);
        assert_eq!(QueryIntent::detect("林浩老師的辦公室在哪"), QueryIntent::Office);
        assert_eq!(QueryIntent::detect("What's his EXTENSION"), QueryIntent::Office);
    }

    #[test]
    fn test_course_keywords() {
        assert_eq!(QueryIntent::detect("What does she teach?"), QueryIntent::Courses);
        assert_eq!(QueryIntent::detect("林浩開什麼課"), QueryIntent::Courses);
    }

    #[test]
    fn test_mixed_or_no_keywords_are_general() {
        assert_eq!(
            QueryIntent::detect("Where is the class Lin Hao teaches?"),
            QueryIntent::General
        );
        assert_eq!(QueryIntent::detect("Tell me about Lin Hao"), QueryIntent::General);
    }

    #[test]
    fn test_keywords_inside_other_words_ignored() {
        assert_eq!(
            QueryIntent::detect("Which classroom is Lin Hao's office in?"),
            QueryIntent::Office
        );
        assert_eq!(
            QueryIntent::detect("Is Lin Hao somewhere around? What does he teach?"),
            QueryIntent::Courses
        );
        assert_eq!(QueryIntent::detect("Tell me about Ann Findlay"), QueryIntent::General);
        assert_eq!(
            QueryIntent::detect("Which courses does Ann Findlay teach?"),
            QueryIntent::Courses
        );
    }
}
