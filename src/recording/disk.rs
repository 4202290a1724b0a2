//! 磁盘剩余空间检测

use std::path::{Path, PathBuf};

use sysinfo::Disks;

/// 剩余空间查询接口 (单位GB, 1GB = 1e9 字节)
pub trait DiskSpace: Send {
    /// 查不到所在磁盘时返回 None
    fn free_gb(&self, path: &Path) -> Option<f64>;
}

/// 通过 sysinfo 查询路径所在分区
#[derive(Default)]
pub struct SysinfoDisk;

/// 目录可能还没创建, 向上找到第一个存在的祖先
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| p.exists())
        .and_then(|p| p.canonicalize().ok())
}

impl DiskSpace for SysinfoDisk {
    fn free_gb(&self, path: &Path) -> Option<f64> {
        let target = existing_ancestor(path)?;
        let disks = Disks::new_with_refreshed_list();

        // 挂载点最长前缀匹配
        disks
            .list()
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space() as f64 / 1e9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_ancestor_of_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("a").join("b");
        let found = existing_ancestor(&missing).unwrap();
        assert_eq!(found, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_free_space_is_non_negative_when_known() {
        let dir = tempfile::tempdir().unwrap();
        if let Some(free) = SysinfoDisk.free_gb(dir.path()) {
            assert!(free >= 0.0);
        }
    }
}
