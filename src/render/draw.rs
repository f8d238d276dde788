// 该文件是 Biaozhu （标注） 项目的一部分。
// src/render/draw.rs - 检测框与标签绘制
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use super::{Annotation, RenderError, caption_baseline};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_ASCENT: i32 = 15; // 基线到文本顶部的距离（粗略估计）
const BOX_STROKE_WIDTH: i32 = 2;
const OVERLAY_COLOR: [u8; 3] = [255, 0, 0]; // 红色

pub struct Draw {
  font: FontArc,
  font_size: f32,
  label_text_ascent: i32,
  stroke_width: i32,
  box_color: Rgb<u8>,
  label_color: Rgb<u8>,
}

impl Draw {
  pub fn new() -> Result<Self, RenderError> {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data)?;

    Ok(Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_text_ascent: LABEL_TEXT_ASCENT,
      stroke_width: BOX_STROKE_WIDTH,
      box_color: Rgb(OVERLAY_COLOR),
      label_color: Rgb(OVERLAY_COLOR),
    })
  }

  /// 绘制边框（由外向内逐像素加粗）与类别标签
  pub fn draw_annotation(&self, image: &mut RgbImage, annotation: &Annotation) {
    let (w, h) = image.dimensions();
    let Some([x_min, y_min, x_max, y_max]) = annotation.bbox.clamped(w, h) else {
      return;
    };

    for thickness in 0..self.stroke_width {
      let width = x_max - x_min + 1 - 2 * thickness;
      let height = y_max - y_min + 1 - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect =
        Rect::at(x_min + thickness, y_min + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, self.box_color);
    }

    let (label_x, baseline) = caption_baseline(x_min, y_min);
    draw_text_mut(
      image,
      self.label_color,
      label_x,
      baseline - self.label_text_ascent,
      PxScale::from(self.font_size),
      &self.font,
      &annotation.label.to_string(),
    );
  }
}
