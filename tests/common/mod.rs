//! Synthetic material system shared by the integration tests.
//!
//! `FixtureSystem` keeps its tables in plain `Vec`s and records every compile
//! request instead of compiling anything, so tests can assert which records
//! were compiled, on which worker, and through which path.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use myth_shader_cache::material::{
    BlendState, CompileResult, CullMode, CustomPieceFile, CustomPieceFileStatus, MaterialSystem,
    PassCache, PassState, PipelineDescriptor, PrecisionMode, PropertyKey, PropertySet,
    PsoCacheEntry, RasterizerState, RenderableCache, ShaderCodeCache, ShaderStage, StageSources,
    StateBlockInterner, StateBlockPool, VertexElement, VertexElementGroup, VertexFormat,
    VertexSemantic, keys,
};

/// Routes the crate's `log` output to the test harness (`RUST_LOG=debug`).
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One call to either compile entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCall {
    pub index: usize,
    pub thread_idx: Option<usize>,
    pub thread_name: Option<String>,
    /// `true` when the call went through the template preprocessor.
    pub reprocessed: bool,
    pub properties: PropertySet,
}

pub struct FixtureSystem {
    pub system_type: u8,
    pub shader_profile: String,
    pub language_version: u16,
    pub precision: PrecisionMode,
    pub fast_shader_build_hack: bool,
    pub template_hash: [u64; 2],
    pub multithreaded: bool,

    pub custom_pieces: Vec<CustomPieceFile>,
    /// `(filename, resource_group)` → checksum of the file "on disk".
    pub files_on_disk: HashMap<(String, String), [u64; 2]>,

    pub shader_code: Vec<ShaderCodeCache>,
    pub renderables: Vec<RenderableCache>,
    pub passes: Vec<PassCache>,
    pub psos: Vec<PsoCacheEntry>,
    pub pool: StateBlockPool,

    /// Record indices whose compilation fails.
    pub fail_on: Vec<usize>,
    /// Record index whose compilation panics.
    pub panic_on: Option<usize>,
    pub compiled: Mutex<Vec<CompileCall>>,
    pub preprocessed_compiles: AtomicUsize,
    pub template_compiles: AtomicUsize,

    pub num_threads: usize,
    pub shaders_generated: usize,
    pub up_to_date: bool,
    pub clear_count: usize,
}

impl Default for FixtureSystem {
    fn default() -> Self {
        Self {
            system_type: 1,
            shader_profile: "glsl".to_owned(),
            language_version: 450,
            precision: PrecisionMode::Full32,
            fast_shader_build_hack: false,
            template_hash: [0x1111, 0x2222],
            multithreaded: true,
            custom_pieces: Vec::new(),
            files_on_disk: HashMap::new(),
            shader_code: Vec::new(),
            renderables: Vec::new(),
            passes: Vec::new(),
            psos: Vec::new(),
            pool: StateBlockPool::new(),
            fail_on: Vec::new(),
            panic_on: None,
            compiled: Mutex::new(Vec::new()),
            preprocessed_compiles: AtomicUsize::new(0),
            template_compiles: AtomicUsize::new(0),
            num_threads: 0,
            shaders_generated: 0,
            up_to_date: false,
            clear_count: 0,
        }
    }
}

impl FixtureSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// A system with `shaders` generated variants and `psos` pipelines
    /// spread over two passes.
    pub fn populated(shaders: usize, psos: usize) -> Self {
        let mut system = Self::new();
        for i in 0..shaders {
            system.add_shader(i);
        }
        for j in 0..psos {
            system.add_pso(j % shaders.max(1), j % 2, j % 2 == 1);
        }
        system
    }

    /// An empty system with the same environment and files as `source`.
    pub fn target_for(source: &FixtureSystem) -> Self {
        let mut target = Self {
            system_type: source.system_type,
            shader_profile: source.shader_profile.clone(),
            language_version: source.language_version,
            precision: source.precision,
            fast_shader_build_hack: source.fast_shader_build_hack,
            template_hash: source.template_hash,
            multithreaded: source.multithreaded,
            ..Self::default()
        };
        target.files_on_disk = source.files_on_disk.clone();
        target
    }

    pub fn add_shader(&mut self, variant: usize) {
        let mut merged = RenderableCache::new(PropertySet::from(
            &[("hlms_variant", variant as i32), ("hlms_normal", 1)][..],
        ));
        merged
            .stage_pieces_mut(ShaderStage::Vertex)
            .insert(PropertyKey::new("custom_vs_pre"), "// vs".to_owned());
        merged
            .stage_pieces_mut(ShaderStage::Pixel)
            .insert(PropertyKey::new("custom_ps_pre"), "// ps".to_owned());

        let mut sources = StageSources::default();
        sources[ShaderStage::Vertex.index()] = Some(format!("vertex shader {variant}"));
        sources[ShaderStage::Pixel.index()] = Some(format!("pixel shader {variant}"));

        self.renderables.push(merged.clone());
        self.shader_code.push(ShaderCodeCache { merged, sources });
    }

    pub fn add_pso(&mut self, renderable_index: usize, pass_index: usize, cull_none: bool) {
        while self.passes.len() <= pass_index {
            let id = self.passes.len();
            self.passes.push(PassCache {
                pass: PassState {
                    color_formats: [16u16 + id as u16].into_iter().collect(),
                    depth_format: 40,
                    sample_count: 1,
                    stencil: false,
                },
                properties: PropertySet::from(&[("hlms_pass_id", id as i32)][..]),
            });
        }

        let rasterizer = RasterizerState {
            cull_mode: if cull_none { CullMode::None } else { CullMode::Back },
            ..RasterizerState::default()
        };
        let group: VertexElementGroup = [
            VertexElement::new(VertexFormat::Float32x3, VertexSemantic::Position),
            VertexElement::new(VertexFormat::Float32x3, VertexSemantic::Normal),
        ]
        .into_iter()
        .collect();

        self.psos.push(PsoCacheEntry {
            renderable_index,
            pass_index,
            pipeline: PipelineDescriptor {
                vertex_elements: vec![group],
                pass: self.passes[pass_index].pass.clone(),
                ..PipelineDescriptor::default()
            },
            rasterizer: self.pool.intern_rasterizer(&rasterizer).unwrap(),
            blend: self.pool.intern_blend(&BlendState::default()).unwrap(),
        });
    }

    /// Registers a custom piece file and returns its name property value.
    pub fn add_custom_piece(
        &mut self,
        filename: &str,
        checksum: [u64; 2],
        from_file: bool,
    ) -> i32 {
        self.custom_pieces.push(CustomPieceFile {
            filename: filename.to_owned(),
            resource_group: "General".to_owned(),
            checksum,
            from_file,
        });
        if from_file {
            self.files_on_disk
                .insert((filename.to_owned(), "General".to_owned()), checksum);
        }
        self.custom_pieces.len() as i32
    }

    /// Makes shader `index` (and its renderable) use custom piece `name`.
    pub fn use_custom_piece(&mut self, index: usize, stage: ShaderStage, name: i32) {
        let key = keys::custom_piece_shader_name(stage);
        self.shader_code[index].merged.properties.set(key, name);
        self.renderables[index].properties.set(key, name);
    }

    pub fn compile_calls(&self) -> Vec<CompileCall> {
        let mut calls = self.compiled.lock().clone();
        calls.sort_by_key(|call| call.index);
        calls
    }

    pub fn compiled_indices(&self) -> Vec<usize> {
        self.compile_calls().iter().map(|call| call.index).collect()
    }

    fn record(
        &self,
        index: usize,
        thread_idx: Option<usize>,
        reprocessed: bool,
        properties: &PropertySet,
    ) -> CompileResult {
        self.compiled.lock().push(CompileCall {
            index,
            thread_idx,
            thread_name: std::thread::current().name().map(str::to_owned),
            reprocessed,
            properties: properties.clone(),
        });

        if self.panic_on == Some(index) {
            panic!("shader {index} crashed the compiler");
        }
        if self.fail_on.contains(&index) {
            return Err(io::Error::other(format!("shader {index} failed to compile")).into());
        }
        Ok(())
    }
}

impl MaterialSystem for FixtureSystem {
    fn system_type(&self) -> u8 {
        self.system_type
    }

    fn shader_profile(&self) -> &str {
        &self.shader_profile
    }

    fn native_shading_language_version(&self) -> u16 {
        self.language_version
    }

    fn supported_precision_mode(&self) -> PrecisionMode {
        self.precision
    }

    fn fast_shader_build_hack(&self) -> bool {
        self.fast_shader_build_hack
    }

    fn template_checksum(&self) -> [u64; 2] {
        self.template_hash
    }

    fn supports_multithreaded_compilation(&self) -> bool {
        self.multithreaded
    }

    fn custom_piece_files(&self) -> &[CustomPieceFile] {
        &self.custom_pieces
    }

    fn is_custom_piece_file_cacheable(&self, name: i32) -> bool {
        usize::try_from(name - 1)
            .ok()
            .and_then(|i| self.custom_pieces.get(i))
            .is_some_and(CustomPieceFile::is_cacheable)
    }

    fn shader_code_cache(&self) -> &[ShaderCodeCache] {
        &self.shader_code
    }

    fn renderable_caches(&self) -> &[RenderableCache] {
        &self.renderables
    }

    fn pass_caches(&self) -> &[PassCache] {
        &self.passes
    }

    fn pso_cache(&self) -> &[PsoCacheEntry] {
        &self.psos
    }

    fn clear_shader_cache(&mut self) {
        self.clear_count += 1;
        self.shader_code.clear();
        self.renderables.clear();
        self.passes.clear();
        self.psos.clear();
        self.shaders_generated = 0;
        self.up_to_date = false;
    }

    fn add_or_refresh_custom_piece_file(
        &mut self,
        filename: &str,
        resource_group: &str,
        expected_checksum: [u64; 2],
    ) -> CustomPieceFileStatus {
        let Some(&checksum) = self
            .files_on_disk
            .get(&(filename.to_owned(), resource_group.to_owned()))
        else {
            return CustomPieceFileStatus::CriticalError;
        };

        self.custom_pieces.retain(|piece| piece.filename != filename);
        self.custom_pieces.push(CustomPieceFile {
            filename: filename.to_owned(),
            resource_group: resource_group.to_owned(),
            checksum,
            from_file: true,
        });

        if checksum == expected_checksum {
            CustomPieceFileStatus::Success
        } else {
            CustomPieceFileStatus::OutOfDate
        }
    }

    fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads;
    }

    fn compile_from_preprocessed_source(
        &self,
        merged: &RenderableCache,
        _sources: &StageSources,
        index: usize,
        thread_idx: Option<usize>,
    ) -> CompileResult {
        self.preprocessed_compiles.fetch_add(1, Ordering::Relaxed);
        self.record(index, thread_idx, false, &merged.properties)
    }

    fn compile_shader_code(
        &self,
        code: &ShaderCodeCache,
        index: usize,
        thread_idx: Option<usize>,
    ) -> CompileResult {
        self.template_compiles.fetch_add(1, Ordering::Relaxed);
        self.record(index, thread_idx, true, &code.merged.properties)
    }

    fn set_shaders_generated(&mut self, count: usize) {
        self.shaders_generated = count;
    }

    fn register_pass_cache(&mut self, pass: PassCache) -> usize {
        if let Some(index) = self.passes.iter().position(|existing| *existing == pass) {
            return index;
        }
        self.passes.push(pass);
        self.passes.len() - 1
    }

    fn mark_shader_cache_up_to_date(&mut self) {
        self.up_to_date = true;
    }
}
