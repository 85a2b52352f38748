use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use glam::Vec3;
use roxmltree::{Document, Node};

use crate::app::{
    AnimationClip, Capabilities, DistanceScale, Keyframe, ObjectKind, ScrubMode, Transform,
};

use super::database::ContentDatabase;
use super::discovery::collect_xml_files_sorted;
use super::types::{
    AudioDef, CameraDef, NodeDef, Parallax, SceneDef, TemplateChildDef, TemplateDef, TimelineDef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    Discovery,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    UnknownAttribute,
    MissingAttribute,
    InvalidValue,
    DuplicateDefinition,
    UnknownReference,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

type CompileResult<T> = Result<T, ContentCompileError>;

/// Compiles every `<Content>` document under `content_dir`. Template ids and
/// scene names are global; node content must name a known template.
pub fn compile_content(content_dir: &Path) -> CompileResult<ContentDatabase> {
    let xml_files = collect_xml_files_sorted(content_dir).map_err(|error| ContentCompileError {
        code: ContentErrorCode::Discovery,
        message: format!("failed to list content directory: {}", error.source),
        file_path: error.path,
        location: None,
    })?;

    let mut templates = Vec::<TemplateDef>::new();
    let mut template_files = HashMap::<String, PathBuf>::new();
    let mut scenes = Vec::<(PathBuf, SceneDef)>::new();
    let mut scene_names = HashSet::<String>::new();

    for xml_file in xml_files {
        let raw = fs::read_to_string(&xml_file).map_err(|source| ContentCompileError {
            code: ContentErrorCode::ReadFile,
            message: format!("failed to read XML file: {source}"),
            file_path: xml_file.clone(),
            location: None,
        })?;
        let parsed = parse_content_document(&xml_file, &raw)?;
        for (location, template) in parsed.templates {
            if let Some(first) = template_files.get(&template.id) {
                return Err(ContentCompileError {
                    code: ContentErrorCode::DuplicateDefinition,
                    message: format!(
                        "template '{}' is already defined in {}",
                        template.id,
                        first.display()
                    ),
                    file_path: xml_file.clone(),
                    location: Some(location),
                });
            }
            template_files.insert(template.id.clone(), xml_file.clone());
            templates.push(template);
        }
        for (location, scene) in parsed.scenes {
            if !scene_names.insert(scene.name.clone()) {
                return Err(ContentCompileError {
                    code: ContentErrorCode::DuplicateDefinition,
                    message: format!("scene '{}' is defined more than once", scene.name),
                    file_path: xml_file.clone(),
                    location: Some(location),
                });
            }
            scenes.push((xml_file.clone(), scene));
        }
    }

    for (file_path, scene) in &scenes {
        check_references(file_path, &scene.nodes, &template_files)?;
    }

    Ok(ContentDatabase::new(
        templates,
        scenes.into_iter().map(|(_, scene)| scene).collect(),
    ))
}

fn check_references(
    file_path: &Path,
    nodes: &[NodeDef],
    templates: &HashMap<String, PathBuf>,
) -> CompileResult<()> {
    for node in nodes {
        if let Some(content) = &node.content {
            if !templates.contains_key(content) {
                return Err(ContentCompileError {
                    code: ContentErrorCode::UnknownReference,
                    message: format!(
                        "node '{}' references unknown template '{}'",
                        node.name, content
                    ),
                    file_path: file_path.to_path_buf(),
                    location: node.location,
                });
            }
        }
        check_references(file_path, &node.children, templates)?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct ParsedDocument {
    templates: Vec<(SourceLocation, TemplateDef)>,
    scenes: Vec<(SourceLocation, SceneDef)>,
}

fn parse_content_document(file_path: &Path, raw: &str) -> CompileResult<ParsedDocument> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let source = Source {
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Content" {
        return Err(source.error(
            ContentErrorCode::InvalidRoot,
            "root element must be <Content>".to_string(),
            root,
        ));
    }

    let mut parsed = ParsedDocument::default();
    for child in elements(root) {
        match child.tag_name().name() {
            "Template" => parsed
                .templates
                .push((source.location(child), source.template(child)?)),
            "Scene" => parsed
                .scenes
                .push((source.location(child), source.scene(child)?)),
            other => {
                return Err(source.error(
                    ContentErrorCode::UnknownElement,
                    format!("unsupported element <{other}>; expected <Template> or <Scene>"),
                    child,
                ))
            }
        }
    }
    Ok(parsed)
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

struct Source<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl Source<'_, '_> {
    fn location(&self, node: Node<'_, '_>) -> SourceLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }
    }

    fn error(
        &self,
        code: ContentErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ContentCompileError {
        ContentCompileError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(self.location(node)),
        }
    }

    fn template(&self, node: Node<'_, '_>) -> CompileResult<TemplateDef> {
        self.allow_attributes(node, &["id", "kind", "radius", "position", "rotation", "scale"])?;
        let id = self.required(node, "id")?;
        let kind = self.object_kind(node)?;
        let mut children = Vec::new();
        let mut child_names = HashSet::new();
        let mut clip = None;

        for child in elements(node) {
            match child.tag_name().name() {
                "Child" => {
                    self.allow_attributes(
                        child,
                        &["name", "kind", "radius", "position", "rotation", "scale"],
                    )?;
                    let name = self.required(child, "name")?;
                    if !child_names.insert(name.clone()) {
                        return Err(self.error(
                            ContentErrorCode::DuplicateDefinition,
                            format!("template '{id}' already has a child named '{name}'"),
                            child,
                        ));
                    }
                    let kind = self.object_kind(child)?;
                    children.push(TemplateChildDef {
                        name,
                        kind,
                        bounds_radius: self.bounds_radius(child, kind)?,
                        transform: self.transform(child)?.unwrap_or_default(),
                    });
                }
                "Clip" => {
                    if clip.is_some() {
                        return Err(self.error(
                            ContentErrorCode::DuplicateDefinition,
                            format!("template '{id}' may declare only one <Clip>"),
                            child,
                        ));
                    }
                    clip = Some(self.clip(child)?);
                }
                other => {
                    return Err(self.error(
                        ContentErrorCode::UnknownElement,
                        format!("unknown element <{other}> in <Template>"),
                        child,
                    ))
                }
            }
        }

        Ok(TemplateDef {
            bounds_radius: self.bounds_radius(node, kind)?,
            transform: self.transform(node)?.unwrap_or_default(),
            id,
            kind,
            children,
            clip,
        })
    }

    fn clip(&self, node: Node<'_, '_>) -> CompileResult<AnimationClip> {
        self.allow_attributes(node, &["name", "duration"])?;
        let name = node.attribute("name").unwrap_or("clip").to_string();
        let duration = self.positive_f32(node, "duration")?.ok_or_else(|| {
            self.error(
                ContentErrorCode::MissingAttribute,
                "<Clip> requires a duration".to_string(),
                node,
            )
        })?;
        let mut keyframes = Vec::new();
        for key in elements(node) {
            if key.tag_name().name() != "Key" {
                return Err(self.error(
                    ContentErrorCode::UnknownElement,
                    format!("unknown element <{}> in <Clip>", key.tag_name().name()),
                    key,
                ));
            }
            self.allow_attributes(key, &["time", "position", "rotation", "scale"])?;
            let time = self.f32_attr(key, "time")?.ok_or_else(|| {
                self.error(
                    ContentErrorCode::MissingAttribute,
                    "<Key> requires a time".to_string(),
                    key,
                )
            })?;
            if !(0.0..=duration).contains(&time) {
                return Err(self.error(
                    ContentErrorCode::InvalidValue,
                    format!("key time {time} is outside the clip duration {duration}"),
                    key,
                ));
            }
            keyframes.push(Keyframe {
                time,
                transform: self.transform(key)?.unwrap_or_default(),
            });
        }
        Ok(AnimationClip::new(name, duration, keyframes))
    }

    fn scene(&self, node: Node<'_, '_>) -> CompileResult<SceneDef> {
        self.allow_attributes(node, &["name", "entryScroll", "scrollLockMs"])?;
        let name = self.required(node, "name")?;
        let entry_scroll = self.f32_attr(node, "entryScroll")?;
        let scroll_lock = self.millis(node, "scrollLockMs")?;
        let mut camera = None;
        let mut audios = Vec::new();
        let mut nodes = Vec::new();

        for child in elements(node) {
            match child.tag_name().name() {
                "Camera" => {
                    if camera.is_some() {
                        return Err(self.error(
                            ContentErrorCode::DuplicateDefinition,
                            format!("scene '{name}' may declare only one <Camera>"),
                            child,
                        ));
                    }
                    camera = Some(self.camera(child)?);
                }
                "Audio" => self.push_audio(&mut audios, child)?,
                "Node" => self.push_node(&mut nodes, child)?,
                other => {
                    return Err(self.error(
                        ContentErrorCode::UnknownElement,
                        format!("unknown element <{other}> in <Scene>"),
                        child,
                    ))
                }
            }
        }

        Ok(SceneDef {
            name,
            camera: camera.unwrap_or_default(),
            entry_scroll,
            scroll_lock,
            audios,
            nodes,
        })
    }

    fn camera(&self, node: Node<'_, '_>) -> CompileResult<CameraDef> {
        self.allow_attributes(node, &["position", "lookAt", "fov", "aspect", "parallax"])?;
        let defaults = CameraDef::default();
        let parallax = match node.attribute("parallax").map(str::trim) {
            None | Some("false") => Parallax::Off,
            Some("true") => Parallax::Configured,
            Some(raw) => match raw.parse::<f32>() {
                Ok(value) if value.is_finite() => Parallax::Strength(value),
                _ => {
                    return Err(self.error(
                        ContentErrorCode::InvalidValue,
                        format!("parallax '{raw}' must be true, false or a number"),
                        node,
                    ))
                }
            },
        };
        Ok(CameraDef {
            position: self.vec3_attr(node, "position")?.unwrap_or(defaults.position),
            look_at: self.vec3_attr(node, "lookAt")?,
            fov_y_degrees: self.positive_f32(node, "fov")?.unwrap_or(defaults.fov_y_degrees),
            aspect: self.positive_f32(node, "aspect")?.unwrap_or(defaults.aspect),
            parallax,
        })
    }

    fn push_audio(&self, audios: &mut Vec<AudioDef>, node: Node<'_, '_>) -> CompileResult<()> {
        let audio = self.audio(node)?;
        if audios.iter().any(|existing| existing.name == audio.name) {
            return Err(self.error(
                ContentErrorCode::DuplicateDefinition,
                format!("audio '{}' is declared twice on the same owner", audio.name),
                node,
            ));
        }
        audios.push(audio);
        Ok(())
    }

    fn audio(&self, node: Node<'_, '_>) -> CompileResult<AudioDef> {
        self.allow_attributes(
            node,
            &["name", "src", "loop", "autoplay", "persist", "volume", "refDistance"],
        )?;
        let volume = self.f32_attr(node, "volume")?.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&volume) {
            return Err(self.error(
                ContentErrorCode::InvalidValue,
                format!("volume {volume} must be within [0, 1]"),
                node,
            ));
        }
        Ok(AudioDef {
            name: self.required(node, "name")?,
            source: self.required(node, "src")?,
            looping: self.bool_attr(node, "loop")?.unwrap_or(false),
            autoplay: self.bool_attr(node, "autoplay")?.unwrap_or(false),
            persistent: self.bool_attr(node, "persist")?.unwrap_or(false),
            volume,
            ref_distance: self.positive_f32(node, "refDistance")?,
        })
    }

    fn push_node(&self, siblings: &mut Vec<NodeDef>, node: Node<'_, '_>) -> CompileResult<()> {
        let parsed = self.node(node)?;
        if siblings.iter().any(|existing| existing.name == parsed.name) {
            return Err(self.error(
                ContentErrorCode::DuplicateDefinition,
                format!("sibling node '{}' is declared twice", parsed.name),
                node,
            ));
        }
        siblings.push(parsed);
        Ok(())
    }

    fn node(&self, node: Node<'_, '_>) -> CompileResult<NodeDef> {
        self.allow_attributes(
            node,
            &[
                "name",
                "content",
                "visibility",
                "holdMs",
                "capabilities",
                "position",
                "rotation",
                "scale",
                "onClick",
                "onHold",
                "payload",
            ],
        )?;
        let name = self.required(node, "name")?;
        let transform = self.transform(node)?;
        let mut timeline = None;
        let mut distance_scale = None;
        let mut audios = Vec::new();
        let mut children = Vec::new();

        for child in elements(node) {
            match child.tag_name().name() {
                "Audio" => self.push_audio(&mut audios, child)?,
                "Node" => self.push_node(&mut children, child)?,
                "Timeline" => timeline = Some(self.timeline(child)?),
                "DistanceScale" => {
                    let base = transform.map(|t| t.scale).unwrap_or(Vec3::ONE);
                    distance_scale = Some(self.distance_scale(child, base)?);
                }
                other => {
                    return Err(self.error(
                        ContentErrorCode::UnknownElement,
                        format!("unknown element <{other}> in <Node>"),
                        child,
                    ))
                }
            }
        }

        Ok(NodeDef {
            content: node.attribute("content").map(str::to_string),
            visibility: self.visibility(node)?,
            hold: self.millis(node, "holdMs")?,
            capabilities: self.capabilities(node)?,
            click_signal: node.attribute("onClick").map(str::to_string),
            hold_signal: node.attribute("onHold").map(str::to_string),
            payload: node.attribute("payload").map(str::to_string),
            location: Some(self.location(node)),
            name,
            transform,
            distance_scale,
            timeline,
            audios,
            children,
        })
    }

    fn timeline(&self, node: Node<'_, '_>) -> CompileResult<TimelineDef> {
        self.allow_attributes(node, &["span", "mode", "drivesCamera"])?;
        let mode = match node.attribute("mode") {
            None | Some("loop") => ScrubMode::Loop,
            Some("clamp") => ScrubMode::Clamp,
            Some(other) => {
                return Err(self.error(
                    ContentErrorCode::InvalidValue,
                    format!("invalid timeline mode '{other}'; allowed values: loop, clamp"),
                    node,
                ))
            }
        };
        Ok(TimelineDef {
            span: self.positive_f32(node, "span")?,
            mode,
            drives_observer: self.bool_attr(node, "drivesCamera")?.unwrap_or(false),
        })
    }

    fn distance_scale(&self, node: Node<'_, '_>, base: Vec3) -> CompileResult<DistanceScale> {
        self.allow_attributes(node, &["reference", "min", "max"])?;
        let reference_distance = self.positive_f32(node, "reference")?.ok_or_else(|| {
            self.error(
                ContentErrorCode::MissingAttribute,
                "<DistanceScale> requires a reference distance".to_string(),
                node,
            )
        })?;
        let min = self.f32_attr(node, "min")?.unwrap_or(0.0);
        let max = self.f32_attr(node, "max")?.unwrap_or(1.0);
        if min < 0.0 || min > max {
            return Err(self.error(
                ContentErrorCode::InvalidValue,
                format!("distance scale range [{min}, {max}] is invalid"),
                node,
            ));
        }
        Ok(DistanceScale {
            reference_distance,
            min,
            max,
            base,
        })
    }

    fn visibility(&self, node: Node<'_, '_>) -> CompileResult<Option<(f32, f32)>> {
        let Some(raw) = node.attribute("visibility") else {
            return Ok(None);
        };
        let bounds = self.floats(node, "visibility", raw)?;
        match bounds.as_slice() {
            [start, end] if start <= end => Ok(Some((*start, *end))),
            [start, end] => Err(self.error(
                ContentErrorCode::InvalidValue,
                format!("visibility window starts at {start} after it ends at {end}"),
                node,
            )),
            _ => Err(self.error(
                ContentErrorCode::InvalidValue,
                format!("visibility '{raw}' must be two numbers 'start,end'"),
                node,
            )),
        }
    }

    fn capabilities(&self, node: Node<'_, '_>) -> CompileResult<Capabilities> {
        let Some(raw) = node.attribute("capabilities") else {
            return Ok(Capabilities::empty());
        };
        let mut capabilities = Capabilities::empty();
        for label in raw.split(',').map(str::trim).filter(|label| !label.is_empty()) {
            let Some(flag) = Capabilities::from_label(label) else {
                return Err(self.error(
                    ContentErrorCode::InvalidValue,
                    format!("unknown capability '{label}'; allowed values: click, hover, hold"),
                    node,
                ));
            };
            capabilities |= flag;
        }
        Ok(capabilities)
    }

    fn object_kind(&self, node: Node<'_, '_>) -> CompileResult<ObjectKind> {
        match node.attribute("kind") {
            None | Some("mesh") => Ok(ObjectKind::Mesh),
            Some("sprite") => Ok(ObjectKind::Sprite),
            Some("group") => Ok(ObjectKind::Group),
            Some(other) => Err(self.error(
                ContentErrorCode::InvalidValue,
                format!("invalid kind '{other}'; allowed values: mesh, sprite, group"),
                node,
            )),
        }
    }

    fn bounds_radius(&self, node: Node<'_, '_>, kind: ObjectKind) -> CompileResult<Option<f32>> {
        let radius = self.positive_f32(node, "radius")?;
        Ok(match kind {
            ObjectKind::Group => radius,
            ObjectKind::Mesh | ObjectKind::Sprite => Some(radius.unwrap_or(1.0)),
        })
    }

    fn transform(&self, node: Node<'_, '_>) -> CompileResult<Option<Transform>> {
        let position = self.vec3_attr(node, "position")?;
        let rotation = self.vec3_attr(node, "rotation")?;
        let scale = match node.attribute("scale") {
            None => None,
            Some(raw) => match self.floats(node, "scale", raw)?.as_slice() {
                [uniform] => Some(Vec3::splat(*uniform)),
                [x, y, z] => Some(Vec3::new(*x, *y, *z)),
                _ => {
                    return Err(self.error(
                        ContentErrorCode::InvalidValue,
                        format!("scale '{raw}' must be one number or 'x,y,z'"),
                        node,
                    ))
                }
            },
        };
        if position.is_none() && rotation.is_none() && scale.is_none() {
            return Ok(None);
        }
        let defaults = Transform::default();
        Ok(Some(Transform {
            position: position.unwrap_or(defaults.position),
            rotation: rotation.unwrap_or(defaults.rotation),
            scale: scale.unwrap_or(defaults.scale),
        }))
    }

    fn allow_attributes(&self, node: Node<'_, '_>, allowed: &[&str]) -> CompileResult<()> {
        for attribute in node.attributes() {
            if !allowed.contains(&attribute.name()) {
                return Err(self.error(
                    ContentErrorCode::UnknownAttribute,
                    format!(
                        "unknown attribute '{}' on <{}>",
                        attribute.name(),
                        node.tag_name().name()
                    ),
                    node,
                ));
            }
        }
        Ok(())
    }

    fn required(&self, node: Node<'_, '_>, name: &str) -> CompileResult<String> {
        let value = node.attribute(name).map(str::trim).unwrap_or_default();
        if value.is_empty() {
            return Err(self.error(
                ContentErrorCode::MissingAttribute,
                format!(
                    "<{}> requires a non-empty '{}' attribute",
                    node.tag_name().name(),
                    name
                ),
                node,
            ));
        }
        Ok(value.to_string())
    }

    fn floats(&self, node: Node<'_, '_>, name: &str, raw: &str) -> CompileResult<Vec<f32>> {
        raw.split(',')
            .map(|part| {
                part.trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or_else(|| {
                        self.error(
                            ContentErrorCode::InvalidValue,
                            format!("{name} '{raw}' contains a value that is not a finite number"),
                            node,
                        )
                    })
            })
            .collect()
    }

    fn f32_attr(&self, node: Node<'_, '_>, name: &str) -> CompileResult<Option<f32>> {
        let Some(raw) = node.attribute(name) else {
            return Ok(None);
        };
        match self.floats(node, name, raw)?.as_slice() {
            [value] => Ok(Some(*value)),
            _ => Err(self.error(
                ContentErrorCode::InvalidValue,
                format!("{name} '{raw}' must be a single number"),
                node,
            )),
        }
    }

    fn positive_f32(&self, node: Node<'_, '_>, name: &str) -> CompileResult<Option<f32>> {
        match self.f32_attr(node, name)? {
            Some(value) if value <= 0.0 => Err(self.error(
                ContentErrorCode::InvalidValue,
                format!("{name} must be > 0, got {value}"),
                node,
            )),
            other => Ok(other),
        }
    }

    fn vec3_attr(&self, node: Node<'_, '_>, name: &str) -> CompileResult<Option<Vec3>> {
        let Some(raw) = node.attribute(name) else {
            return Ok(None);
        };
        match self.floats(node, name, raw)?.as_slice() {
            [x, y, z] => Ok(Some(Vec3::new(*x, *y, *z))),
            _ => Err(self.error(
                ContentErrorCode::InvalidValue,
                format!("{name} '{raw}' must be 'x,y,z'"),
                node,
            )),
        }
    }

    fn bool_attr(&self, node: Node<'_, '_>, name: &str) -> CompileResult<Option<bool>> {
        match node.attribute(name).map(str::trim) {
            None => Ok(None),
            Some("true") => Ok(Some(true)),
            Some("false") => Ok(Some(false)),
            Some(other) => Err(self.error(
                ContentErrorCode::InvalidValue,
                format!("{name} '{other}' must be true or false"),
                node,
            )),
        }
    }

    fn millis(&self, node: Node<'_, '_>, name: &str) -> CompileResult<Option<Duration>> {
        let Some(raw) = node.attribute(name) else {
            return Ok(None);
        };
        match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
            _ => Err(self.error(
                ContentErrorCode::InvalidValue,
                format!("{name} '{raw}' must be a whole number of milliseconds > 0"),
                node,
            )),
        }
    }
}
