//! Record/repository source scaffolding.
//!
//! # Responsibility
//! - Validate a record name and derive struct, file and repository names.
//! - Render record and repository sources from embedded templates.
//! - Write them into their target directories.
//!
//! # Invariants
//! - Nothing is written when validation fails.
//! - Existing sources are only replaced with `force`.

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const RECORD_TEMPLATE: &str = include_str!("../templates/record.rs.tmpl");
const REPOSITORY_TEMPLATE: &str = include_str!("../templates/repository.rs.tmpl");

static RECORD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9_]*$").expect("valid record name regex"));
static FOREIGN_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid foreign key regex"));

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("record name is required")]
    EmptyName,
    #[error("record name must start with an uppercase letter and contain only letters, digits or `_` (got `{0}`)")]
    InvalidName(String),
    #[error("invalid foreign key reference `{0}`")]
    InvalidForeignKey(String),
    #[error("files already exist: {} (use -f to overwrite)", display_paths(.0))]
    AlreadyExists(Vec<PathBuf>),
    #[error("failed to write `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Inputs for one `template-generate` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldRequest {
    pub name: String,
    pub models_dir: PathBuf,
    pub repos_dir: PathBuf,
    pub foreign_keys: Vec<String>,
    pub force: bool,
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub struct_name: String,
    pub repository_name: String,
    pub record_file: PathBuf,
    pub repository_file: PathBuf,
    pub foreign_keys: Vec<String>,
}

struct ForeignKey {
    struct_name: String,
    snake: String,
}

impl ScaffoldRequest {
    pub fn struct_name(&self) -> String {
        to_struct_name(&self.name)
    }

    pub fn snake_name(&self) -> String {
        to_snake_case(&self.struct_name())
    }

    pub fn repository_name(&self) -> String {
        format!("{}Repository", self.struct_name())
    }

    pub fn record_path(&self) -> PathBuf {
        self.models_dir.join(format!("{}.rs", self.snake_name()))
    }

    pub fn repository_path(&self) -> PathBuf {
        self.repos_dir.join(format!("{}_repo.rs", self.snake_name()))
    }

    pub fn validate(&self) -> Result<(), ScaffoldError> {
        if self.name.is_empty() {
            return Err(ScaffoldError::EmptyName);
        }
        if !RECORD_NAME_RE.is_match(&self.name) {
            return Err(ScaffoldError::InvalidName(self.name.clone()));
        }
        if let Some(bad) = self
            .foreign_keys
            .iter()
            .find(|fk| !FOREIGN_KEY_RE.is_match(fk))
        {
            return Err(ScaffoldError::InvalidForeignKey(bad.clone()));
        }

        if !self.force {
            let existing: Vec<PathBuf> = [self.record_path(), self.repository_path()]
                .into_iter()
                .filter(|path| path.exists())
                .collect();
            if !existing.is_empty() {
                return Err(ScaffoldError::AlreadyExists(existing));
            }
        }
        Ok(())
    }

    pub fn render_record(&self) -> String {
        let fks = self.foreign_key_names();
        let struct_name = self.struct_name();
        let snake = self.snake_name();

        let fk_fields = if fks.is_empty() {
            String::new()
        } else {
            let mut lines = format!(
                "    // Foreign keys: uncomment together with the matching lines below\n    // and the `get_by_*` helpers in `{snake}_repo.rs`.\n"
            );
            lines.push_str(&render_each(&fks, |fk| {
                format!("    // pub {}_id: Option<i64>,\n", fk.snake)
            }));
            lines
        };

        let imports = fk_imports(&fks);
        let init = render_each(&fks, |fk| format!("            // {}_id: None,\n", fk.snake));
        let defs = render_each(&fks, |fk| {
            format!(
                "        // FieldDef::integer(\"{0}_id\").nullable().references(\"{0}\"),\n",
                fk.snake
            )
        });
        let values = render_each(&fks, |fk| format!("            // self.{}_id.into(),\n", fk.snake));
        let parse = render_each(&fks, |fk| {
            format!(
                "            // {0}_id: fields.opt_integer(\"{0}_id\")?,\n",
                fk.snake
            )
        });

        render(
            RECORD_TEMPLATE,
            &[
                ("{{STRUCT}}", struct_name.as_str()),
                ("{{SNAKE}}", snake.as_str()),
                ("{{FK_IMPORTS}}", imports.as_str()),
                ("{{FK_FIELDS}}", fk_fields.as_str()),
                ("{{FK_INIT}}", init.as_str()),
                ("{{FK_DEFS}}", defs.as_str()),
                ("{{FK_VALUES}}", values.as_str()),
                ("{{FK_PARSE}}", parse.as_str()),
            ],
        )
    }

    pub fn render_repository(&self) -> String {
        let fks = self.foreign_key_names();
        let struct_name = self.struct_name();
        let snake = self.snake_name();
        let repository = self.repository_name();

        let queries = render_each(&fks, |fk| {
            format!(
                "\n    // All {struct_name} rows owned by one {fk_struct}; requires `{fk}_id` in `{snake}.rs`.\n    // pub fn get_by_{fk}(&self, {fk}_id: i64) -> RepoResult<Vec<{struct_name}>> {{\n    //     self.base.get_by_field(\"{fk}_id\", {fk}_id, false)\n    // }}\n",
                fk = fk.snake,
                fk_struct = fk.struct_name,
            )
        });

        let imports = fk_imports(&fks);

        render(
            REPOSITORY_TEMPLATE,
            &[
                ("{{STRUCT}}", struct_name.as_str()),
                ("{{SNAKE}}", snake.as_str()),
                ("{{REPO}}", repository.as_str()),
                ("{{FK_IMPORTS}}", imports.as_str()),
                ("{{FK_QUERIES}}", queries.as_str()),
            ],
        )
    }

    /// Validates, then writes both sources and their module declarations.
    pub fn generate(&self) -> Result<Generated, ScaffoldError> {
        self.validate()?;

        let snake = self.snake_name();
        prepare_module_dir(&self.models_dir, "Record types.", &snake)?;
        prepare_module_dir(&self.repos_dir, "Repositories.", &format!("{snake}_repo"))?;

        let record_file = self.record_path();
        let repository_file = self.repository_path();
        write_file(&record_file, &self.render_record())?;
        write_file(&repository_file, &self.render_repository())?;

        info!(
            "event=scaffold_generate module=cli status=ok record={} foreign_keys={}",
            self.struct_name(),
            self.foreign_keys.len()
        );
        Ok(Generated {
            struct_name: self.struct_name(),
            repository_name: self.repository_name(),
            record_file,
            repository_file,
            foreign_keys: self.foreign_keys.clone(),
        })
    }

    fn foreign_key_names(&self) -> Vec<ForeignKey> {
        self.foreign_keys
            .iter()
            .map(|fk| {
                let struct_name = to_struct_name(fk);
                ForeignKey {
                    snake: to_snake_case(&struct_name),
                    struct_name,
                }
            })
            .collect()
    }
}

/// `order_item` -> `OrderItem`; names without `_` only get a capital first
/// letter.
pub fn to_struct_name(name: &str) -> String {
    if name.contains('_') {
        return name
            .split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect::<String>(),
                    None => String::new(),
                }
            })
            .collect();
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `OrderItem` -> `order_item`.
pub fn to_snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);
    for (index, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && index > 0 {
            snake.push('_');
        }
        snake.extend(ch.to_lowercase());
    }
    snake
}

fn render(template: &str, substitutions: &[(&str, &str)]) -> String {
    substitutions
        .iter()
        .fold(template.to_string(), |text, (placeholder, value)| {
            text.replace(placeholder, value)
        })
}

fn render_each(fks: &[ForeignKey], line: impl Fn(&ForeignKey) -> String) -> String {
    fks.iter().map(line).collect()
}

fn fk_imports(fks: &[ForeignKey]) -> String {
    render_each(fks, |fk| {
        format!("// use crate::models::{}::{};\n", fk.snake, fk.struct_name)
    })
}

fn prepare_module_dir(dir: &Path, doc: &str, module: &str) -> Result<(), ScaffoldError> {
    fs::create_dir_all(dir).map_err(|source| ScaffoldError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mod_file = dir.join("mod.rs");
    let mut contents = match fs::read_to_string(&mod_file) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => format!("//! {doc}\n\n"),
        Err(source) => {
            return Err(ScaffoldError::Io {
                path: mod_file,
                source,
            })
        }
    };

    let declaration = format!("pub mod {module};");
    if contents.lines().any(|line| line.trim() == declaration) {
        return Ok(());
    }
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&declaration);
    contents.push('\n');
    write_file(&mod_file, &contents)
}

fn write_file(path: &Path, contents: &str) -> Result<(), ScaffoldError> {
    fs::write(path, contents).map_err(|source| ScaffoldError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::{to_snake_case, to_struct_name, ScaffoldError, ScaffoldRequest};
    use std::fs;
    use std::path::Path;

    fn request(root: &Path, name: &str, fks: &[&str]) -> ScaffoldRequest {
        ScaffoldRequest {
            name: name.to_string(),
            models_dir: root.join("models"),
            repos_dir: root.join("repos"),
            foreign_keys: fks.iter().map(|fk| fk.to_string()).collect(),
            force: false,
        }
    }

    #[test]
    fn derives_names() {
        assert_eq!(to_struct_name("Order_item"), "OrderItem");
        assert_eq!(to_struct_name("BlogPost"), "BlogPost");
        assert_eq!(to_struct_name("category"), "Category");
        assert_eq!(to_snake_case("BlogPost"), "blog_post");
        assert_eq!(to_snake_case("User"), "user");

        let req = request(Path::new("/tmp"), "BlogPost", &[]);
        assert_eq!(req.repository_name(), "BlogPostRepository");
        assert!(req.record_path().ends_with("models/blog_post.rs"));
        assert!(req.repository_path().ends_with("repos/blog_post_repo.rs"));
    }

    #[test]
    fn rejects_lowercase_and_empty_names() {
        let root = Path::new("/tmp");
        assert!(matches!(
            request(root, "user", &[]).validate(),
            Err(ScaffoldError::InvalidName(name)) if name == "user"
        ));
        assert!(matches!(
            request(root, "", &[]).validate(),
            Err(ScaffoldError::EmptyName)
        ));
        assert!(matches!(
            request(root, "Bad-Name", &[]).validate(),
            Err(ScaffoldError::InvalidName(_))
        ));
        assert!(matches!(
            request(root, "Post", &["9lives"]).validate(),
            Err(ScaffoldError::InvalidForeignKey(_))
        ));
    }

    #[test]
    fn renders_foreign_keys_on_both_sides() {
        let req = request(Path::new("/tmp"), "Comment", &["User", "blog_post"]);
        let record = req.render_record();
        let repo = req.render_repository();

        assert!(record.contains("pub struct Comment {"));
        assert!(record.contains("const TABLE: &'static str = \"comment\";"));
        assert!(record.contains("// pub user_id: Option<i64>,"));
        assert!(record.contains(
            "// FieldDef::integer(\"blog_post_id\").nullable().references(\"blog_post\"),"
        ));
        assert!(record.contains("`get_by_*` helpers in `comment_repo.rs`"));
        assert!(record.contains("// use crate::models::blog_post::BlogPost;"));

        assert!(repo.contains("pub struct CommentRepository<'conn>"));
        assert!(repo.contains("// pub fn get_by_user(&self, user_id: i64) -> RepoResult<Vec<Comment>> {"));
        assert!(repo.contains("requires `blog_post_id` in `comment.rs`"));
        assert!(!repo.contains("{{"));
        assert!(!record.contains("{{"));
    }

    #[test]
    fn renders_without_foreign_keys() {
        let req = request(Path::new("/tmp"), "Tag", &[]);
        let record = req.render_record();
        assert!(!record.contains("Foreign keys"));
        assert!(!record.contains("// use crate::models"));
        let repo = req.render_repository();
        assert!(repo.contains("pub fn get_by_name(&self, name: &str) -> RepoResult<Vec<Tag>>"));
        assert!(!repo.contains("// pub fn get_by_"));
        assert!(!repo.contains("{{"));
    }

    #[test]
    fn generate_writes_files_and_module_declarations() {
        let dir = tempfile::tempdir().unwrap();
        let generated = request(dir.path(), "Product", &["User"]).generate().unwrap();

        assert_eq!(generated.struct_name, "Product");
        assert!(generated.record_file.exists());
        assert!(generated.repository_file.exists());
        let models_mod = fs::read_to_string(dir.path().join("models/mod.rs")).unwrap();
        assert_eq!(models_mod, "//! Record types.\n\npub mod product;\n");
        let repos_mod = fs::read_to_string(dir.path().join("repos/mod.rs")).unwrap();
        assert!(repos_mod.contains("pub mod product_repo;"));
    }

    #[test]
    fn existing_files_need_force() {
        let dir = tempfile::tempdir().unwrap();
        request(dir.path(), "Product", &[]).generate().unwrap();
        fs::write(dir.path().join("models/product.rs"), "// edited").unwrap();

        let err = request(dir.path(), "Product", &[]).generate().unwrap_err();
        assert!(matches!(err, ScaffoldError::AlreadyExists(ref paths) if paths.len() == 2));
        let kept = fs::read_to_string(dir.path().join("models/product.rs")).unwrap();
        assert_eq!(kept, "// edited");

        let mut forced = request(dir.path(), "Product", &[]);
        forced.force = true;
        forced.generate().unwrap();
        let rewritten = fs::read_to_string(dir.path().join("models/product.rs")).unwrap();
        assert!(rewritten.contains("pub struct Product"));
        let models_mod = fs::read_to_string(dir.path().join("models/mod.rs")).unwrap();
        assert_eq!(models_mod.matches("pub mod product;").count(), 1);
    }
}
