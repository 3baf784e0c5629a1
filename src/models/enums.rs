use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the serde wire name.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(MessageRole {
    User => "user",
    Bot => "bot",
});

str_enum!(Language {
    En => "en",
    Ml => "ml",
});

impl Default for Language {
    fn default() -> Self {
        Self::En
    }
}

str_enum!(TranslationLanguage {
    En => "en",
    Ml => "ml",
    Hi => "hi",
});

str_enum!(ExperienceLevel {
    Beginner => "beginner",
    Intermediate => "intermediate",
    Expert => "expert",
});

str_enum!(FeedbackCategory {
    Accuracy => "accuracy",
    Helpfulness => "helpfulness",
    Language => "language",
    ResponseTime => "response_time",
    Other => "other",
});
