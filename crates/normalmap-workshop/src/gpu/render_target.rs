use wgpu::{Device, Texture, TextureFormat, TextureView};

/// An off-screen colour target that can also be sampled and read back.
pub struct RenderTarget {
    pub texture: Texture,
    pub view: TextureView,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    /// Prefer [`super::ResourceProvider::create_render_target`], which checks
    /// dimensions and driver errors.
    pub fn new(device: &Device, width: u32, height: u32, format: TextureFormat, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Two same-sized targets for passes that read the previous result.
pub struct PingPongTarget {
    pub targets: [RenderTarget; 2],
    pub current: usize,
}

impl PingPongTarget {
    pub fn new(a: RenderTarget, b: RenderTarget) -> Self {
        Self {
            targets: [a, b],
            current: 0,
        }
    }

    pub fn write_target(&self) -> &RenderTarget {
        &self.targets[self.current]
    }

    pub fn read_target(&self) -> &RenderTarget {
        &self.targets[1 - self.current]
    }

    pub fn flip(&mut self) {
        self.current = 1 - self.current;
    }

    pub fn size(&self) -> (u32, u32) {
        self.targets[0].size()
    }
}
