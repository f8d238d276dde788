// 该文件是 Biaozhu （标注） 项目的一部分。
// src/dataset/natural.rs - 自然排序
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

use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
  Digits(&'a str),
  Text(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
  let mut out = Vec::new();
  let mut start = 0;
  let mut in_digits = None;

  for (i, c) in s.char_indices() {
    let is_digit = c.is_ascii_digit();
    match in_digits {
      Some(prev) if prev != is_digit => {
        out.push(make_chunk(&s[start..i], prev));
        start = i;
      }
      _ => {}
    }
    in_digits = Some(is_digit);
  }
  if let Some(prev) = in_digits {
    out.push(make_chunk(&s[start..], prev));
  }
  out
}

fn make_chunk(s: &str, digits: bool) -> Chunk<'_> {
  if digits { Chunk::Digits(s) } else { Chunk::Text(s) }
}

/// 比较两个十进制数字串的数值大小，不受长度限制
fn cmp_digits(a: &str, b: &str) -> Ordering {
  let a_trim = a.trim_start_matches('0');
  let b_trim = b.trim_start_matches('0');
  a_trim
    .len()
    .cmp(&b_trim.len())
    .then_with(|| a_trim.cmp(b_trim))
}

/// 数字段按数值比较，其余按字典序比较；数值相同时回退到原字符串比较以保证全序
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
  let (ca, cb) = (chunks(a), chunks(b));
  for (x, y) in ca.iter().zip(cb.iter()) {
    let ord = match (x, y) {
      (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
      (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
      (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
      (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
    };
    if ord != Ordering::Equal {
      return ord;
    }
  }
  ca.len().cmp(&cb.len()).then_with(|| a.cmp(b))
}

pub fn natural_sort<S: AsRef<str>>(items: &mut [S]) {
  items.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}
