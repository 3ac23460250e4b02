use std::env;
use std::path::{Path, PathBuf};

use ldraw_config::AppConfig;
use ldraw_core::Dom;
use tracing::{debug, trace};

const LIBRARY_PATHS_ENV: &str = "LDRAW_LIBRARY_PATHS";

/// 零件库目录中存放库文件的子目录，按查找顺序排列。
const LIBRARY_FOLDERS: [&str; 3] = ["parts", "p", "models"];

/// 零件库根目录列表，靠前的目录优先。
#[derive(Debug, Clone, Default)]
pub struct LibraryLocator {
    search_roots: Vec<PathBuf>,
}

impl LibraryLocator {
    pub fn from_config(base_dir: Option<&Path>, config: &AppConfig) -> Self {
        let mut roots: Vec<PathBuf> = Vec::new();

        if let Some(dir) = base_dir {
            roots.push(dir.to_path_buf());
        }

        roots.extend(
            config
                .library
                .search_paths
                .iter()
                .cloned()
                .filter(|path| path.is_dir()),
        );

        if let Some(env_paths) = env::var_os(LIBRARY_PATHS_ENV) {
            for path in env::split_paths(&env_paths) {
                if path.is_dir() {
                    roots.push(path);
                }
            }
        }

        Self::from_roots(roots)
    }

    pub fn from_roots(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        // 去重，保持靠前优先级。
        let mut deduped: Vec<PathBuf> = Vec::new();
        for root in roots {
            if !deduped.iter().any(|existing| existing == &root) {
                deduped.push(root);
            }
        }
        LibraryLocator {
            search_roots: deduped,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    /// 按目标名在库目录中查找文件；目标名中的 `\` 视为路径分隔符。
    pub fn resolve(&self, target_name: &str) -> Option<PathBuf> {
        let relative: PathBuf = target_name
            .trim()
            .split(['\\', '/'])
            .filter(|segment| !segment.is_empty())
            .collect();
        if relative.as_os_str().is_empty() {
            return None;
        }

        for root in &self.search_roots {
            let candidates = std::iter::once(root.join(&relative))
                .chain(LIBRARY_FOLDERS.iter().map(|folder| root.join(folder).join(&relative)));
            for candidate in candidates {
                trace!(candidate = %candidate.display(), "library locator candidate");
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }

        debug!(target_name, "零件库中未找到目标");
        None
    }
}

/// 把库根目录交给文档模型，位于其下的文档视为已发布。
pub fn apply_library_roots(dom: &mut Dom, locator: &LibraryLocator) {
    dom.set_library_roots(locator.roots().to_vec());
}
