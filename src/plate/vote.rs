// 该文件是 Chewei （车位） 项目的一部分。
// src/plate/vote.rs - 多数投票
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::HashMap;

/// 投票结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote<'a> {
  pub text: &'a str,
  pub count: usize,
}

/// 返回出现次数最多的字符串（精确匹配）
///
/// 票数相同时取最先出现者。输入顺序即置信度从高到低的顺序。
pub fn majority_vote<S: AsRef<str>>(readings: &[S]) -> Option<Vote<'_>> {
  let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
  for (position, reading) in readings.iter().enumerate() {
    let entry = counts.entry(reading.as_ref()).or_insert((0, position));
    entry.0 += 1;
  }

  counts
    .into_iter()
    .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
      count_a.cmp(count_b).then(first_b.cmp(first_a))
    })
    .map(|(text, (count, _))| Vote { text, count })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_has_no_winner() {
    assert_eq!(majority_vote::<String>(&[]), None);
  }

  #[test]
  fn most_frequent_wins() {
    let vote = majority_vote(&["AB1Z34", "AB1234", "AB1234"]).unwrap();
    assert_eq!(vote, Vote { text: "AB1234", count: 2 });
  }

  #[test]
  fn tie_goes_to_first_seen() {
    let vote = majority_vote(&["XY987", "XY981", "XY981", "XY987"]).unwrap();
    assert_eq!(vote.text, "XY987");
    let vote = majority_vote(&["B", "A", "C"]).unwrap();
    assert_eq!(vote.text, "B");
  }

  #[test]
  fn comparison_is_exact() {
    let vote = majority_vote(&["ab1234", "AB1234", "AB1234 "]).unwrap();
    assert_eq!(vote, Vote { text: "ab1234", count: 1 });
  }
}
