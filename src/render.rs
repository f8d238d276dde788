// 该文件是 Biaozhu （标注） 项目的一部分。
// src/render.rs - 标注渲染
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

use std::collections::BTreeSet;
use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, RgbImage};
use thiserror::Error;

use crate::label::{ClassLabel, ClassNames, Detection};

pub mod draw;

pub use self::draw::Draw;

/// 标签放在框上方所需的最小顶部距离
pub const CAPTION_TOP_MARGIN: i32 = 20;
/// 框上方时文本基线相对框顶的偏移
pub const CAPTION_ABOVE_OFFSET: i32 = 10;
/// 框内时文本基线相对框顶的偏移
pub const CAPTION_INSIDE_OFFSET: i32 = 20;

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("字体加载错误: {0}")]
  Font(#[from] ab_glyph::InvalidFont),
  #[error("图像解码错误: {0}")]
  Decode(#[source] image::ImageError),
  #[error("图像编码错误: {0}")]
  Encode(#[source] image::ImageError),
}

/// 像素坐标下的检测框 (左上角, 右下角)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl PixelBox {
  /// 归一化的中心点/宽高转为图像实际尺寸下的角点
  pub fn from_detection(det: &Detection, width: u32, height: u32) -> Self {
    let (w, h) = (width as f32, height as f32);
    PixelBox {
      x1: (det.cx - det.width / 2.0) * w,
      y1: (det.cy - det.height / 2.0) * h,
      x2: (det.cx + det.width / 2.0) * w,
      y2: (det.cy + det.height / 2.0) * h,
    }
  }

  /// 截断为整数并限制在图像范围内，退化为空框时返回 None
  pub fn clamped(&self, width: u32, height: u32) -> Option<[i32; 4]> {
    if width == 0 || height == 0 {
      return None;
    }
    let max_x = width as i32 - 1;
    let max_y = height as i32 - 1;

    let x1 = (self.x1 as i32).clamp(0, max_x);
    let y1 = (self.y1 as i32).clamp(0, max_y);
    let x2 = (self.x2 as i32).clamp(0, max_x);
    let y2 = (self.y2 as i32).clamp(0, max_y);

    if x1 >= x2 || y1 >= y2 {
      return None;
    }
    Some([x1, y1, x2, y2])
  }
}

/// 标签文本的基线位置：框顶离图像顶部过近时放进框内
pub fn caption_baseline(x1: i32, y1: i32) -> (i32, i32) {
  if y1 > CAPTION_TOP_MARGIN {
    (x1, y1 - CAPTION_ABOVE_OFFSET)
  } else {
    (x1, y1 + CAPTION_INSIDE_OFFSET)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  pub label: ClassLabel,
  pub bbox: PixelBox,
}

/// 单张图像的渲染结果
#[derive(Debug, Clone)]
pub struct Rendered {
  pub image: RgbImage,
  pub count: usize,
  pub labels: BTreeSet<String>,
}

impl Rendered {
  /// 以 ", " 连接的类别，无检测时为 "None"
  pub fn categories(&self) -> String {
    if self.labels.is_empty() {
      "None".to_string()
    } else {
      self.labels.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    }
  }
}

pub fn annotate(
  detections: &[Detection],
  class_names: &ClassNames,
  width: u32,
  height: u32,
) -> Vec<Annotation> {
  detections
    .iter()
    .map(|det| Annotation {
      label: class_names.resolve(det.class_index),
      bbox: PixelBox::from_detection(det, width, height),
    })
    .collect()
}

/// 在图像上绘制所有检测并统计数量与类别
pub fn render_image(
  draw: &Draw,
  mut image: RgbImage,
  detections: &[Detection],
  class_names: &ClassNames,
) -> Rendered {
  let (width, height) = image.dimensions();
  let annotations = annotate(detections, class_names, width, height);

  let mut labels = BTreeSet::new();
  for annotation in &annotations {
    draw.draw_annotation(&mut image, annotation);
    labels.insert(annotation.label.to_string());
  }

  Rendered {
    image,
    count: annotations.len(),
    labels,
  }
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, RenderError> {
  image::load_from_memory(bytes)
    .map(|image| image.to_rgb8())
    .map_err(RenderError::Decode)
}

/// 按文件扩展名选择编码格式，无法识别时使用 PNG
pub fn output_format(file_name: &str) -> ImageFormat {
  ImageFormat::from_path(Path::new(file_name)).unwrap_or(ImageFormat::Png)
}

pub fn encode_image(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>, RenderError> {
  let mut buffer = Cursor::new(Vec::new());
  image
    .write_to(&mut buffer, format)
    .map_err(RenderError::Encode)?;
  Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn det(class_index: u32, cx: f32, cy: f32, width: f32, height: f32) -> Detection {
    Detection {
      class_index,
      cx,
      cy,
      width,
      height,
    }
  }

  #[test]
  fn pixel_box_maps_normalized_geometry() {
    let bbox = PixelBox::from_detection(&det(0, 0.5, 0.5, 0.2, 0.4), 200, 100);
    let close = |a: f32, b: f32| (a - b).abs() < 1e-3;
    assert!(close(bbox.x1, 80.0), "{bbox:?}");
    assert!(close(bbox.y1, 30.0), "{bbox:?}");
    assert!(close(bbox.x2, 120.0), "{bbox:?}");
    assert!(close(bbox.y2, 70.0), "{bbox:?}");
  }

  #[test]
  fn pixel_box_is_ordered_for_positive_size() {
    for cx in [0.0f32, 0.25, 0.5, 1.0] {
      for cy in [0.0f32, 0.5, 1.0] {
        let bbox = PixelBox::from_detection(&det(0, cx, cy, 0.01, 0.3), 640, 480);
        assert!(bbox.x1 < bbox.x2);
        assert!(bbox.y1 < bbox.y2);
      }
    }
  }

  #[test]
  fn clamping_handles_edges() {
    let bbox = PixelBox::from_detection(&det(0, 0.0, 1.0, 0.5, 0.5), 100, 100);
    assert_eq!(bbox.clamped(100, 100), Some([0, 75, 25, 99]));

    let bbox = PixelBox::from_detection(&det(0, 1.0, 0.0, 0.0, 0.0), 100, 100);
    assert_eq!(bbox.clamped(100, 100), None);
    assert_eq!(bbox.clamped(0, 0), None);
  }

  #[test]
  fn caption_moves_inside_near_top() {
    assert_eq!(caption_baseline(5, 100), (5, 90));
    assert_eq!(caption_baseline(5, 21), (5, 11));
    assert_eq!(caption_baseline(5, 20), (5, 40));
    assert_eq!(caption_baseline(5, 0), (5, 20));
  }

  #[test]
  fn render_counts_and_collects_labels() {
    let draw = Draw::new().unwrap();
    let names = ClassNames::new(vec!["cat".into(), "dog".into(), "cow".into()]);
    let image = RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]));
    let dets = [
      det(0, 0.5, 0.5, 0.5, 0.5),
      det(0, 0.2, 0.2, 0.1, 0.1),
      det(7, 0.8, 0.8, 0.2, 0.2),
    ];

    let rendered = render_image(&draw, image, &dets, &names);
    assert_eq!(rendered.count, 3);
    assert_eq!(rendered.categories(), "Unknown(7), cat");
    // 框的左上角被涂成红色
    assert_eq!(*rendered.image.get_pixel(16, 12), Rgb([255, 0, 0]));
  }

  #[test]
  fn render_without_detections_is_none() {
    let draw = Draw::new().unwrap();
    let image = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
    let rendered = render_image(&draw, image.clone(), &[], &ClassNames::default());
    assert_eq!(rendered.count, 0);
    assert_eq!(rendered.categories(), "None");
    assert_eq!(rendered.image, image);
  }

  #[test]
  fn decode_rejects_garbage_and_encode_round_trips() {
    assert!(matches!(
      decode_image(b"not an image"),
      Err(RenderError::Decode(_))
    ));

    let image = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
    let bytes = encode_image(&image, output_format("x.png")).unwrap();
    assert_eq!(decode_image(&bytes).unwrap(), image);
    assert_eq!(output_format("x.JPG"), ImageFormat::Jpeg);
    assert_eq!(output_format("x.unknown"), ImageFormat::Png);
  }
}
