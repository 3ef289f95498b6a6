//! Deployment variants.
//!
//! The bot runs either as an image generator (Flux Schnell) or a video
//! generator (WAN 2.1). Each variant fixes its template, the node ids that
//! receive per-request values, its network timeouts and polling cadence,
//! and how the artifact is handed back to the user.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::json;

use crate::error::CoreError;
use crate::template::{JobTemplate, NodeBindings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Image,
    Video,
}

/// How the produced artifact is sent back through the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Sent inline as a photo.
    Photo,
    /// Sent as a file attachment under a fixed name.
    Document { filename: &'static str },
}

/// Everything that differs between the two deployments.
#[derive(Debug, Clone)]
pub struct VariantProfile {
    pub variant: Variant,
    pub bindings: NodeBindings,
    /// Default template file name, relative to the working directory.
    pub workflow_file: &'static str,
    /// Timeout for `POST /prompt`.
    pub submit_timeout: Duration,
    /// Timeout for each `GET /history/{id}`.
    pub poll_timeout: Duration,
    /// Pause between two history lookups.
    pub poll_interval: Duration,
    /// Timeout for `GET /view`.
    pub fetch_timeout: Duration,
    /// Upper bound on the whole submit-to-completion wait.
    pub deadline: Duration,
    pub delivery: Delivery,
    /// Word used in user-facing messages ("image", "video").
    pub noun: &'static str,
    pub greeting: &'static str,
}

impl Variant {
    pub fn profile(self) -> VariantProfile {
        match self {
            Variant::Image => VariantProfile {
                variant: self,
                bindings: NodeBindings {
                    prompt_node: "6",
                    seed_node: "31",
                    output_node: "9",
                },
                workflow_file: "flux_schnell.json",
                submit_timeout: Duration::from_secs(120),
                poll_timeout: Duration::from_secs(30),
                poll_interval: Duration::from_secs(3),
                fetch_timeout: Duration::from_secs(30),
                deadline: Duration::from_secs(15 * 60),
                delivery: Delivery::Photo,
                noun: "image",
                greeting: "I generate images with Flux. Send me a prompt in English.",
            },
            Variant::Video => VariantProfile {
                variant: self,
                bindings: NodeBindings {
                    prompt_node: "6",
                    seed_node: "3",
                    output_node: "28",
                },
                workflow_file: "wan_video_workflow.json",
                submit_timeout: Duration::from_secs(300),
                poll_timeout: Duration::from_secs(60),
                poll_interval: Duration::from_secs(5),
                fetch_timeout: Duration::from_secs(60),
                deadline: Duration::from_secs(60 * 60),
                delivery: Delivery::Document {
                    filename: "animation.webp",
                },
                noun: "video",
                greeting: "I generate videos with the WAN model. Send me a prompt in English.",
            },
        }
    }

    /// Built-in template installed when no file exists yet.
    pub fn default_template(self) -> JobTemplate {
        let value = match self {
            Variant::Image => flux_schnell(),
            Variant::Video => wan_video(),
        };
        match value {
            serde_json::Value::Object(nodes) => JobTemplate::from(nodes),
            _ => JobTemplate::default(),
        }
    }
}

impl FromStr for Variant {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "flux" => Ok(Variant::Image),
            "video" | "wan" => Ok(Variant::Video),
            other => Err(CoreError::UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Image => f.write_str("image"),
            Variant::Video => f.write_str("video"),
        }
    }
}

fn flux_schnell() -> serde_json::Value {
    json!({
        "6": {"inputs": {"text": "Replace this text with prompt", "clip": ["38", 0]}, "class_type": "CLIPTextEncode"},
        "8": {"inputs": {"samples": ["31", 0], "vae": ["40", 0]}, "class_type": "VAEDecode"},
        "9": {"inputs": {"filename_prefix": "ComfyUI", "images": ["8", 0]}, "class_type": "SaveImage"},
        "27": {"inputs": {"width": 1024, "height": 1024, "batch_size": 1}, "class_type": "EmptySD3LatentImage"},
        "31": {
            "inputs": {
                "seed": 0, "steps": 4, "cfg": 1, "sampler_name": "euler", "scheduler": "simple", "denoise": 1,
                "model": ["39", 0], "positive": ["6", 0], "negative": ["33", 0], "latent_image": ["27", 0]
            },
            "class_type": "KSampler"
        },
        "33": {"inputs": {"text": "", "clip": ["38", 0]}, "class_type": "CLIPTextEncode"},
        "38": {
            "inputs": {
                "clip_name1": "clip_l.safetensors", "clip_name2": "t5xxl_fp8_e4m3fn.safetensors",
                "type": "flux", "device": "default"
            },
            "class_type": "DualCLIPLoader"
        },
        "39": {"inputs": {"unet_name": "flux1-schnell-fp8-e4m3fn.safetensors", "weight_dtype": "default"}, "class_type": "UNETLoader"},
        "40": {"inputs": {"vae_name": "flux_vae.safetensors"}, "class_type": "VAELoader"}
    })
}

fn wan_video() -> serde_json::Value {
    json!({
        "3": {
            "inputs": {
                "seed": 82628696717253u64, "steps": 30, "cfg": 6, "sampler_name": "uni_pc", "scheduler": "simple",
                "denoise": 1, "model": ["48", 0], "positive": ["6", 0], "negative": ["7", 0], "latent_image": ["40", 0]
            },
            "class_type": "KSampler",
            "_meta": {"title": "KSampler"}
        },
        "6": {
            "inputs": {"text": "REPLACE THIS TEXT WITH PROMPT", "clip": ["38", 0]},
            "class_type": "CLIPTextEncode",
            "_meta": {"title": "CLIP Text Encode (Positive Prompt)"}
        },
        "7": {
            "inputs": {
                "text": "色调艳丽，过曝，静态，细节模糊不清，字幕，风格，作品，画作，画面，静止，整体发灰，最差质量，低质量，JPEG压缩残留，丑陋的，残缺的，多余的手指，画得不好的手部，画得不好的脸部，畸形的，毁容的，形态畸形的肢体，手指融合，静止不动的画面，杂乱的背景，三条腿，背景人很多，倒着走",
                "clip": ["38", 0]
            },
            "class_type": "CLIPTextEncode",
            "_meta": {"title": "CLIP Text Encode (Negative Prompt)"}
        },
        "8": {
            "inputs": {"samples": ["3", 0], "vae": ["39", 0]},
            "class_type": "VAEDecode",
            "_meta": {"title": "VAE Decode"}
        },
        "28": {
            "inputs": {
                "filename_prefix": "ComfyUI", "fps": 16, "lossless": false, "quality": 90,
                "method": "default", "images": ["8", 0]
            },
            "class_type": "SaveAnimatedWEBP",
            "_meta": {"title": "Save Animated WEBP"}
        },
        "37": {
            "inputs": {"unet_name": "wan2.1_t2v_1.3B_fp16.safetensors", "weight_dtype": "default"},
            "class_type": "UNETLoader",
            "_meta": {"title": "Load Diffusion Model"}
        },
        "38": {
            "inputs": {"clip_name": "umt5_xxl_fp8_e4m3fn_scaled.safetensors", "type": "wan", "device": "default"},
            "class_type": "CLIPLoader",
            "_meta": {"title": "Load CLIP"}
        },
        "39": {
            "inputs": {"vae_name": "wan_2.1_vae.safetensors"},
            "class_type": "VAELoader",
            "_meta": {"title": "Load VAE"}
        },
        "40": {
            "inputs": {"width": 832, "height": 480, "length": 33, "batch_size": 1},
            "class_type": "EmptyHunyuanLatentVideo",
            "_meta": {"title": "EmptyHunyuanLatentVideo"}
        },
        "48": {
            "inputs": {"shift": 8, "model": ["37", 0]},
            "class_type": "ModelSamplingSD3",
            "_meta": {"title": "ModelSamplingSD3"}
        }
    })
}
