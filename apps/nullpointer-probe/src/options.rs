//! Command-line options.

use anyhow::{bail, Context};
use ash::vk;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    pub help: bool,
    pub headless: bool,
    pub validation: bool,
    pub present_mode: vk::PresentModeKHR,
    pub width: u32,
    pub height: u32,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            help: false,
            headless: false,
            validation: cfg!(debug_assertions),
            present_mode: vk::PresentModeKHR::MAILBOX,
            width: 640,
            height: 480,
        }
    }
}

impl ProbeOptions {
    pub fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut options = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => options.help = true,
                "--headless" => options.headless = true,
                "--no-validation" => options.validation = false,
                "--fifo" => options.present_mode = vk::PresentModeKHR::FIFO,
                "--size" => {
                    let value = args.next().context("--size needs a value like 800x600")?;
                    (options.width, options.height) = parse_size(&value)?;
                }
                other => bail!("Unknown argument {other:?}, see --help"),
            }
        }

        Ok(options)
    }
}

fn parse_size(value: &str) -> anyhow::Result<(u32, u32)> {
    let (width, height) = value
        .split_once('x')
        .with_context(|| format!("Size {value:?} is not WxH"))?;
    let width: u32 = width.parse().with_context(|| format!("Bad width in {value:?}"))?;
    let height: u32 = height.parse().with_context(|| format!("Bad height in {value:?}"))?;
    if width == 0 || height == 0 {
        bail!("Size {value:?} must be non-zero");
    }
    Ok((width, height))
}
