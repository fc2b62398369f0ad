use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
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

str_enum!(ExamStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Error => "error",
});

str_enum!(FileKind {
    Image => "image",
    Pdf => "pdf",
});

str_enum!(ValueFlag {
    Normal => "normal",
    High => "high",
    Low => "low",
});

str_enum!(ExtractionSource {
    Pattern => "pattern",
    External => "external",
});

str_enum!(RangeSource {
    Document => "document",
    Table => "table",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn exam_status_round_trip() {
        for (variant, s) in [
            (ExamStatus::Pending, "pending"),
            (ExamStatus::Processing, "processing"),
            (ExamStatus::Completed, "completed"),
            (ExamStatus::Error, "error"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(ExamStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn file_kind_round_trip() {
        assert_eq!(FileKind::from_str("image").unwrap(), FileKind::Image);
        assert_eq!(FileKind::from_str("pdf").unwrap(), FileKind::Pdf);
        assert_eq!(FileKind::Pdf.to_string(), "pdf");
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let json = serde_json::to_string(&ExtractionSource::External).unwrap();
        assert_eq!(json, "\"external\"");
        let flag: ValueFlag = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(flag, ValueFlag::High);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(FileKind::from_str("docx").is_err());
        assert!(ExamStatus::from_str("done").is_err());
        assert!(ValueFlag::from_str("").is_err());
    }
}
