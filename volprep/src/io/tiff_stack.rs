//! Multi-page TIFF stacks.
//!
//! Pages are stored channel fastest: page `z * channels + c` holds plane `z`
//! of channel `c`. The first page may carry an ImageJ-style description
//! (`key=value` lines) giving the channel and slice counts and the physical
//! voxel size; without one every page is a Z slice of a single channel.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tiff::TiffError;

use crate::error::{ResourceError, Result};
use crate::io::{ImageShape, VolumeReader};
use crate::volume::{ChannelImage, PhysicalPixelSize, Volume, VolumeShape};

/// Parsed ImageJ-style image description.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StackDescription {
    pub channels: Option<usize>,
    pub slices: Option<usize>,
    pub pixel_size: Option<PhysicalPixelSize>,
}

impl StackDescription {
    /// Returns `None` when the text carries none of the known keys.
    pub fn parse(text: &str) -> Option<Self> {
        let mut description = Self::default();
        let mut spacing = [None::<f64>; 3];
        let mut known = false;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "channels" => description.channels = value.parse().ok(),
                "slices" => description.slices = value.parse().ok(),
                "spacing" => spacing[0] = value.parse().ok(),
                "pixel_size_y" => spacing[1] = value.parse().ok(),
                "pixel_size_x" => spacing[2] = value.parse().ok(),
                _ => continue,
            }
            known = true;
        }

        if spacing.iter().any(Option::is_some) {
            let [z, y, x] = spacing.map(|v| v.unwrap_or(1.0));
            description.pixel_size = Some(PhysicalPixelSize { z, y, x });
        }
        known.then_some(description)
    }

    pub fn render(&self) -> String {
        let channels = self.channels.unwrap_or(1);
        let mut text = String::from("ImageJ=1.11a\n");
        if let Some(slices) = self.slices {
            text.push_str(&format!("images={}\n", channels * slices));
            text.push_str(&format!("slices={slices}\n"));
        }
        text.push_str(&format!("channels={channels}\n"));
        if channels > 1 {
            text.push_str("hyperstack=true\n");
        }
        if let Some(size) = self.pixel_size {
            text.push_str("unit=micron\n");
            text.push_str(&format!("spacing={}\n", size.z));
            text.push_str(&format!("pixel_size_y={}\n", size.y));
            text.push_str(&format!("pixel_size_x={}\n", size.x));
        }
        text
    }
}

/// Reads TIFF Z stacks from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffReader;

impl TiffReader {
    pub fn new() -> Self {
        Self
    }
}

struct Header {
    description: StackDescription,
    channels: usize,
    width: usize,
    height: usize,
}

fn tiff_error(path: &Path) -> impl Fn(TiffError) -> ResourceError + '_ {
    move |source| ResourceError::Tiff {
        path: path.to_path_buf(),
        source,
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> ResourceError {
    ResourceError::Malformed {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn open(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).map_err(|e| ResourceError::io(path, e))?;
    let decoder = Decoder::new(BufReader::new(file))
        .map_err(tiff_error(path))?
        .with_limits(Limits::unlimited());
    Ok(decoder)
}

fn page_dimensions(
    path: &Path,
    decoder: &mut Decoder<BufReader<File>>,
) -> Result<(usize, usize)> {
    match decoder.colortype().map_err(tiff_error(path))? {
        tiff::ColorType::Gray(_) => {}
        other => return Err(malformed(path, format!("unsupported color type {other:?}")).into()),
    }
    let (width, height) = decoder.dimensions().map_err(tiff_error(path))?;
    Ok((width as usize, height as usize))
}

fn read_header(path: &Path, decoder: &mut Decoder<BufReader<File>>) -> Result<Header> {
    let text = decoder
        .find_tag(Tag::ImageDescription)
        .map_err(tiff_error(path))?
        .map(|value| value.into_string())
        .transpose()
        .map_err(tiff_error(path))?;
    let description = text
        .as_deref()
        .and_then(StackDescription::parse)
        .unwrap_or_default();
    let channels = description.channels.unwrap_or(1);
    if channels == 0 {
        return Err(malformed(path, "description declares zero channels").into());
    }
    let (width, height) = page_dimensions(path, decoder)?;
    Ok(Header {
        description,
        channels,
        width,
        height,
    })
}

/// Converts page count into Z depth, checking it against the description.
fn stack_depth(path: &Path, header: &Header, pages: usize) -> Result<usize> {
    if pages % header.channels != 0 {
        return Err(malformed(
            path,
            format!("{pages} pages do not divide into {} channels", header.channels),
        )
        .into());
    }
    let depth = pages / header.channels;
    if let Some(slices) = header.description.slices {
        if slices != depth {
            return Err(malformed(
                path,
                format!("description declares {slices} slices, file has {depth}"),
            )
            .into());
        }
    }
    Ok(depth)
}

fn decode_plane(path: &Path, page: DecodingResult) -> Result<Vec<f32>> {
    let plane = match page {
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        _ => return Err(malformed(path, "unsupported sample format").into()),
    };
    Ok(plane)
}

impl VolumeReader for TiffReader {
    fn read_channel(&self, path: &Path, channel: usize) -> Result<ChannelImage> {
        let mut decoder = open(path)?;
        let header = read_header(path, &mut decoder)?;
        if channel >= header.channels {
            return Err(ResourceError::ChannelOutOfRange {
                path: path.to_path_buf(),
                channel,
                channels: header.channels,
            }
            .into());
        }

        let plane_len = header.width * header.height;
        let mut voxels = Vec::new();
        let mut page = 0usize;
        loop {
            if page % header.channels == channel {
                if page_dimensions(path, &mut decoder)? != (header.width, header.height) {
                    return Err(malformed(path, format!("page {page} has a different size")).into());
                }
                let plane = decode_plane(path, decoder.read_image().map_err(tiff_error(path))?)?;
                if plane.len() != plane_len {
                    return Err(malformed(path, format!("page {page} is not single-sample")).into());
                }
                voxels.extend_from_slice(&plane);
            }
            page += 1;
            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(tiff_error(path))?;
        }

        let depth = stack_depth(path, &header, page)?;
        let shape = VolumeShape::new(depth, header.height, header.width);
        tracing::debug!(path = %path.display(), channel, ?shape, "Read TIFF channel");

        Ok(ChannelImage {
            volume: Volume::new(shape, voxels),
            pixel_size: header.description.pixel_size,
        })
    }

    fn probe(&self, path: &Path) -> Result<ImageShape> {
        let mut decoder = open(path)?;
        let header = read_header(path, &mut decoder)?;
        let mut pages = 1usize;
        while decoder.more_images() {
            decoder.next_image().map_err(tiff_error(path))?;
            pages += 1;
        }
        let depth = stack_depth(path, &header, pages)?;
        Ok(ImageShape::new(
            header.channels,
            VolumeShape::new(depth, header.height, header.width),
        ))
    }
}

/// Writes single- or multi-channel Z stacks readable by [`TiffReader`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffWriter;

impl TiffWriter {
    pub fn write_u8(
        path: &Path,
        volume: &Volume<u8>,
        pixel_size: Option<PhysicalPixelSize>,
    ) -> Result<()> {
        write_pages::<colortype::Gray8>(path, &[volume], pixel_size)
    }

    pub fn write_u16(
        path: &Path,
        volume: &Volume<u16>,
        pixel_size: Option<PhysicalPixelSize>,
    ) -> Result<()> {
        write_pages::<colortype::Gray16>(path, &[volume], pixel_size)
    }

    pub fn write_f32(
        path: &Path,
        volume: &Volume<f32>,
        pixel_size: Option<PhysicalPixelSize>,
    ) -> Result<()> {
        write_pages::<colortype::Gray32Float>(path, &[volume], pixel_size)
    }

    /// Interleaves `channels` page by page (channel fastest).
    pub fn write_channels_f32(
        path: &Path,
        channels: &[Volume<f32>],
        pixel_size: Option<PhysicalPixelSize>,
    ) -> Result<()> {
        let channels: Vec<&Volume<f32>> = channels.iter().collect();
        write_pages::<colortype::Gray32Float>(path, &channels, pixel_size)
    }
}

fn write_pages<C>(
    path: &Path,
    channels: &[&Volume<C::Inner>],
    pixel_size: Option<PhysicalPixelSize>,
) -> Result<()>
where
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let Some(first) = channels.first() else {
        return Err(malformed(path, "no channels to write").into());
    };
    let shape = first.shape();
    if channels.iter().any(|c| c.shape() != shape) {
        return Err(malformed(path, "channels differ in shape").into());
    }
    if shape.voxel_count() == 0 {
        return Err(malformed(path, format!("cannot write empty volume {shape:?}")).into());
    }
    let (Ok(width), Ok(height)) = (u32::try_from(shape.width), u32::try_from(shape.height)) else {
        return Err(malformed(path, format!("plane {shape:?} too large for TIFF")).into());
    };

    let description = StackDescription {
        channels: Some(channels.len()),
        slices: Some(shape.depth),
        pixel_size,
    }
    .render();

    let file = File::create(path).map_err(|e| ResourceError::io(path, e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_error(path))?;
    for z in 0..shape.depth {
        for (c, volume) in channels.iter().enumerate() {
            let mut image = encoder
                .new_image::<C>(width, height)
                .map_err(tiff_error(path))?;
            if z == 0 && c == 0 {
                image
                    .encoder()
                    .write_tag(Tag::ImageDescription, description.as_str())
                    .map_err(tiff_error(path))?;
            }
            image.write_data(volume.plane(z)).map_err(tiff_error(path))?;
        }
    }

    tracing::debug!(path = %path.display(), channels = channels.len(), ?shape, "Wrote TIFF stack");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use common::test_utils::test_output_path;

    #[test]
    fn test_u16_stack_round_trips() {
        let path = test_output_path("tiff_u16_stack.tif");
        let shape = VolumeShape::new(3, 5, 7);
        let voxels: Vec<u16> = (0..shape.voxel_count()).map(|i| (i * 300) as u16).collect();
        let volume = Volume::new(shape, voxels);
        let size = PhysicalPixelSize {
            z: 0.29,
            y: 0.108,
            x: 0.108,
        };

        TiffWriter::write_u16(&path, &volume, Some(size)).unwrap();

        let reader = TiffReader::new();
        assert_eq!(reader.probe(&path).unwrap(), ImageShape::new(1, shape));
        let image = reader.read_single(&path).unwrap();
        assert_eq!(image.volume, volume.map(f32::from));
        assert_eq!(image.pixel_size, Some(size));
    }

    #[test]
    fn test_multi_channel_pages_are_channel_fastest() {
        let path = test_output_path("tiff_multi_channel.tif");
        let shape = VolumeShape::new(4, 3, 2);
        let channels: Vec<Volume> = (0..3)
            .map(|c| Volume::from_fn(shape, |z, y, x| (c * 1000 + z * 100 + y * 10 + x) as f32))
            .collect();

        TiffWriter::write_channels_f32(&path, &channels, None).unwrap();

        let reader = TiffReader::new();
        assert_eq!(reader.probe(&path).unwrap(), ImageShape::new(3, shape));
        for (c, expected) in channels.iter().enumerate() {
            let image = reader.read_channel(&path, c).unwrap();
            assert_eq!(&image.volume, expected);
            assert_eq!(image.pixel_size, None);
        }
        assert!(matches!(
            reader.read_channel(&path, 3),
            Err(Error::Resource(ResourceError::ChannelOutOfRange { channels: 3, .. }))
        ));
        assert!(matches!(
            reader.read_single(&path),
            Err(Error::Resource(ResourceError::Malformed { .. }))
        ));
    }

    #[test]
    fn test_plain_stack_without_description() {
        let path = test_output_path("tiff_plain_stack.tif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();
            for z in 0..3u8 {
                encoder
                    .write_image::<colortype::Gray8>(2, 2, &[z, z, z, z + 1])
                    .unwrap();
            }
        }

        let image = TiffReader::new().read_single(&path).unwrap();
        assert_eq!(image.volume.shape(), VolumeShape::new(3, 2, 2));
        assert_eq!(image.volume[(2, 1, 1)], 3.0);
        assert_eq!(image.pixel_size, None);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = TiffReader::new()
            .probe(Path::new("/definitely/not/here.tif"))
            .unwrap_err();
        assert!(matches!(err, Error::Resource(ResourceError::NotFound(_))));
    }

    #[test]
    fn test_description_parsing() {
        let text = "ImageJ=1.52p\nimages=130\nchannels=2\nslices=65\nhyperstack=true\nspacing=0.29\n";
        let description = StackDescription::parse(text).unwrap();
        assert_eq!(description.channels, Some(2));
        assert_eq!(description.slices, Some(65));
        assert_eq!(
            description.pixel_size,
            Some(PhysicalPixelSize { z: 0.29, y: 1.0, x: 1.0 })
        );

        assert_eq!(StackDescription::parse("Created by a camera"), None);
        let rendered = StackDescription::parse(&description.render()).unwrap();
        assert_eq!(rendered, description);
    }
}
