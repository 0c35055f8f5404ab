use crate::config::FormsConfig;
use crate::value::FileRef;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Clone, Debug, PartialEq)]
pub struct FileConstraints {
    pub max_size: u64,
    pub max_files: usize,
    /// Empty means any type is accepted.
    pub allowed_types: Vec<String>,
}

impl Default for FileConstraints {
    fn default() -> Self {
        Self {
            max_size: 5 * 1024 * 1024,
            max_files: 5,
            allowed_types: Vec::new(),
        }
    }
}

impl From<&FormsConfig> for FileConstraints {
    fn from(config: &FormsConfig) -> Self {
        Self {
            max_size: config.max_file_size,
            max_files: config.max_files,
            allowed_types: config.allowed_file_types.clone(),
        }
    }
}

/// Every violation found, in file order, after the count check.
pub fn validate_files(files: &[FileRef], constraints: &FileConstraints) -> Vec<String> {
    let mut errors = Vec::new();
    if files.len() > constraints.max_files {
        errors.push(format!("Maximum {} files allowed", constraints.max_files));
    }

    for file in files {
        if file.size > constraints.max_size {
            errors.push(format!(
                "File \"{}\" exceeds maximum size of {}MB",
                file.name,
                constraints.max_size as f64 / MIB
            ));
        }
        if !constraints.allowed_types.is_empty()
            && !constraints
                .allowed_types
                .iter()
                .any(|allowed| allowed == &file.mime_type)
        {
            errors.push(format!(
                "File \"{}\" has unsupported type. Allowed types: {}",
                file.name,
                constraints.allowed_types.join(", ")
            ));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str, size: u64) -> FileRef {
        FileRef::sized(name, "application/pdf", size)
    }

    #[test]
    fn six_valid_files_yield_only_the_count_message() {
        let files = (0..6)
            .map(|index| pdf(&format!("doc-{index}.pdf"), 1024))
            .collect::<Vec<_>>();
        let errors = validate_files(&files, &FileConstraints::default());
        assert_eq!(errors, vec!["Maximum 5 files allowed".to_string()]);
    }

    #[test]
    fn size_and_type_violations_name_the_file() {
        let constraints = FileConstraints {
            max_size: 1024 * 1024,
            max_files: 5,
            allowed_types: vec!["image/png".into(), "image/jpeg".into()],
        };
        let files = vec![
            FileRef::sized("ok.png", "image/png", 10),
            pdf("manual.pdf", 3 * 1024 * 1024),
        ];
        let errors = validate_files(&files, &constraints);
        assert_eq!(
            errors,
            vec![
                "File \"manual.pdf\" exceeds maximum size of 1MB".to_string(),
                "File \"manual.pdf\" has unsupported type. Allowed types: image/png, image/jpeg"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn fractional_limits_keep_their_fraction() {
        let constraints = FileConstraints {
            max_size: 1024 * 1024 + 512 * 1024,
            ..FileConstraints::default()
        };
        let errors = validate_files(&[pdf("big.pdf", 2 * 1024 * 1024)], &constraints);
        assert_eq!(errors, vec!["File \"big.pdf\" exceeds maximum size of 1.5MB".to_string()]);
    }

    #[test]
    fn empty_allow_list_accepts_any_type() {
        let files = vec![FileRef::sized("x.bin", "application/octet-stream", 1)];
        assert!(validate_files(&files, &FileConstraints::default()).is_empty());
    }
}
