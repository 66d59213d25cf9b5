//! 有序表的下界查找.
//!
//! 所有定位器 (索引表、VBRI 目录、MLLT 参考点、Xing 目录) 都依赖同一种查找:
//! 在非递减序列中找到 "不大于目标值的最大元素", 遇到相等元素时取第一个.

/// 按键查找不大于 `target` 的最大元素下标
///
/// 序列中存在与 `target` 相等的元素时返回其中第一个的下标;
/// 所有元素都大于 `target` 时返回 `None`.
pub fn floor_index_by_key<T, K, F>(values: &[T], target: &K, key: F) -> Option<usize>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let idx = values.partition_point(|v| key(v) < *target);
    if idx < values.len() && key(&values[idx]) == *target {
        Some(idx)
    } else {
        idx.checked_sub(1)
    }
}

/// 查找不大于 `target` 的最大元素下标
pub fn floor_index<T: Ord + Copy>(values: &[T], target: T) -> Option<usize> {
    floor_index_by_key(values, &target, |v| *v)
}

/// 同 [`floor_index`], 但结果被约束在表内: 目标小于首元素时返回 0
pub fn floor_index_clamped<T: Ord + Copy>(values: &[T], target: T) -> usize {
    floor_index(values, target).unwrap_or(0)
}

/// 同 [`floor_index_by_key`], 但结果被约束在表内
pub fn floor_index_clamped_by_key<T, K, F>(values: &[T], target: &K, key: F) -> usize
where
    K: Ord,
    F: Fn(&T) -> K,
{
    floor_index_by_key(values, target, key).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_精确命中与区间内() {
        let values = [0i64, 100, 200, 300];
        assert_eq!(floor_index(&values, 200), Some(2));
        assert_eq!(floor_index(&values, 250), Some(2));
        assert_eq!(floor_index(&values, 10_000), Some(3));
    }

    #[test]
    fn test_小于首元素() {
        let values = [10u64, 20, 30];
        assert_eq!(floor_index(&values, 5), None);
        assert_eq!(floor_index_clamped(&values, 5), 0);
    }

    #[test]
    fn test_重复元素取第一个() {
        let values = [0u8, 5, 5, 5, 9];
        assert_eq!(floor_index(&values, 5), Some(1));
        assert_eq!(floor_index(&values, 7), Some(3));
    }

    #[test]
    fn test_按键查找_加宽比较() {
        // u8 表与超出 u8 范围的目标比较
        let toc = [0u8, 64, 128, 255];
        assert_eq!(floor_index_clamped_by_key(&toc, &256i64, |&v| i64::from(v)), 3);
        assert_eq!(floor_index_clamped_by_key(&toc, &100i64, |&v| i64::from(v)), 1);
    }

    #[test]
    fn test_空表() {
        let values: [i64; 0] = [];
        assert_eq!(floor_index(&values, 1), None);
        assert_eq!(floor_index_clamped(&values, 1), 0);
    }
}
