//! Codec for the compiled module descriptor blob.
//!
//! The blob is shaped like a standard `module-info.class`: a class file whose
//! only payload is the `Module` family of attributes. The codec reads and
//! writes exactly the subset a linker needs; constant pool tags outside the
//! class file specification are rejected rather than skipped.

use std::collections::BTreeSet;
use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;

use modlink_types::{Descriptor, DescriptorError, Exports, Modifiers, Opens, Provides, Requires};

const MAGIC: u32 = 0xCAFE_BABE;
const MAJOR_VERSION: u16 = 53;
const MINOR_VERSION: u16 = 0;

// Class-level flag marking the file as a module descriptor.
const ACC_MODULE: u16 = 0x8000;

// Module attribute flags.
const ACC_OPEN: u16 = 0x0020;
const ACC_SYNTHETIC: u16 = 0x1000;
const ACC_MANDATED: u16 = 0x8000;

// Requires flags.
const ACC_TRANSITIVE: u16 = 0x0020;
const ACC_STATIC_PHASE: u16 = 0x0040;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class(u16),
    Module(u16),
    Package(u16),
    // Present for index bookkeeping only; module descriptors do not
    // reference these.
    Other,
    // Second slot of a long or double constant.
    Unusable,
}

struct Pool {
    constants: Vec<Constant>,
}

impl Pool {
    fn get(&self, index: u16) -> Result<&Constant, DescriptorError> {
        self.constants
            .get(index as usize)
            .ok_or(DescriptorError::BadConstantRef(index))
    }

    fn utf8(&self, index: u16) -> Result<&str, DescriptorError> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(DescriptorError::BadConstantRef(index)),
        }
    }

    fn module_name(&self, index: u16) -> Result<String, DescriptorError> {
        match self.get(index)? {
            Constant::Module(name) => Ok(self.utf8(*name)?.to_owned()),
            _ => Err(DescriptorError::BadConstantRef(index)),
        }
    }

    fn package_name(&self, index: u16) -> Result<String, DescriptorError> {
        match self.get(index)? {
            Constant::Package(name) => Ok(self.utf8(*name)?.replace('/', ".")),
            _ => Err(DescriptorError::BadConstantRef(index)),
        }
    }

    fn class_name(&self, index: u16) -> Result<String, DescriptorError> {
        match self.get(index)? {
            Constant::Class(name) => Ok(self.utf8(*name)?.replace('/', ".")),
            _ => Err(DescriptorError::BadConstantRef(index)),
        }
    }
}

struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader {
            cursor: Cursor::new(bytes),
        }
    }

    fn u8(&mut self) -> Result<u8, DescriptorError> {
        self.cursor.read_u8().map_err(|_| DescriptorError::Truncated)
    }

    fn u16(&mut self) -> Result<u16, DescriptorError> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| DescriptorError::Truncated)
    }

    fn u32(&mut self) -> Result<u32, DescriptorError> {
        self.cursor
            .read_u32::<BigEndian>()
            .map_err(|_| DescriptorError::Truncated)
    }

    fn bytes(&mut self, len: usize) -> Result<Vec<u8>, DescriptorError> {
        let mut buf = vec![0u8; len];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| DescriptorError::Truncated)?;
        Ok(buf)
    }

    fn skip(&mut self, len: u64) -> Result<(), DescriptorError> {
        let pos = self.cursor.position();
        let end = self.cursor.get_ref().len() as u64;
        if pos + len > end {
            return Err(DescriptorError::Truncated);
        }
        self.cursor.set_position(pos + len);
        Ok(())
    }
}

/// Parse the constant pool of a class file, leaving the reader positioned at
/// the `access_flags` item. Shared with the content indexer, which only needs
/// the pool and `this_class`.
fn read_constant_pool(r: &mut Reader<'_>) -> Result<Pool, DescriptorError> {
    let count = r.u16()?;
    // Index 0 is unusable by definition.
    let mut constants = vec![Constant::Unusable];
    let mut index = 1u16;
    while index < count {
        let tag = r.u8()?;
        let constant = match tag {
            TAG_UTF8 => {
                let len = r.u16()? as usize;
                let raw = r.bytes(len)?;
                let text = String::from_utf8(raw)
                    .map_err(|_| DescriptorError::Malformed("non-UTF-8 string constant".into()))?;
                Constant::Utf8(text)
            }
            TAG_CLASS => Constant::Class(r.u16()?),
            TAG_MODULE => Constant::Module(r.u16()?),
            TAG_PACKAGE => Constant::Package(r.u16()?),
            TAG_STRING | TAG_METHOD_TYPE => {
                r.skip(2)?;
                Constant::Other
            }
            TAG_INTEGER | TAG_FLOAT | TAG_FIELDREF | TAG_METHODREF | TAG_INTERFACE_METHODREF
            | TAG_NAME_AND_TYPE | TAG_DYNAMIC | TAG_INVOKE_DYNAMIC => {
                r.skip(4)?;
                Constant::Other
            }
            TAG_METHOD_HANDLE => {
                r.skip(3)?;
                Constant::Other
            }
            TAG_LONG | TAG_DOUBLE => {
                r.skip(8)?;
                constants.push(Constant::Other);
                constants.push(Constant::Unusable);
                index += 2;
                continue;
            }
            other => return Err(DescriptorError::UnknownConstantTag { tag: other, index }),
        };
        constants.push(constant);
        index += 1;
    }
    Ok(Pool { constants })
}

/// Extract the fully qualified (dotted) name a compiled class declares for
/// itself. Used by the content indexer; tolerates arbitrary class files.
pub(crate) fn class_name_of(bytes: &[u8]) -> Result<String, DescriptorError> {
    let mut r = Reader::new(bytes);
    if r.u32()? != MAGIC {
        return Err(DescriptorError::Malformed("bad class file magic".into()));
    }
    r.skip(4)?; // minor + major
    let pool = read_constant_pool(&mut r)?;
    r.u16()?; // access_flags
    let this_class = r.u16()?;
    pool.class_name(this_class)
}

/// Decode a compiled module descriptor.
pub fn decode(bytes: &[u8]) -> Result<Descriptor, DescriptorError> {
    let mut r = Reader::new(bytes);
    if r.u32()? != MAGIC {
        return Err(DescriptorError::Malformed("bad class file magic".into()));
    }
    r.skip(4)?; // minor + major
    let pool = read_constant_pool(&mut r)?;

    let access_flags = r.u16()?;
    if access_flags & ACC_MODULE == 0 {
        return Err(DescriptorError::Malformed(
            "class file is not a module descriptor".into(),
        ));
    }
    r.u16()?; // this_class ("module-info")
    r.u16()?; // super_class
    let interfaces = r.u16()?;
    r.skip(interfaces as u64 * 2)?;
    let fields = r.u16()?;
    let methods = r.u16()?;
    if fields != 0 || methods != 0 {
        return Err(DescriptorError::Malformed(
            "module descriptor declares fields or methods".into(),
        ));
    }

    let mut descriptor = Descriptor::default();
    let mut explicit_packages: Option<BTreeSet<String>> = None;

    let attribute_count = r.u16()?;
    for _ in 0..attribute_count {
        let name_index = r.u16()?;
        let length = r.u32()?;
        match pool.utf8(name_index)? {
            "Module" => read_module_attribute(&mut r, &pool, &mut descriptor)?,
            "ModulePackages" => {
                let count = r.u16()?;
                let mut packages = BTreeSet::new();
                for _ in 0..count {
                    packages.insert(pool.package_name(r.u16()?)?);
                }
                explicit_packages = Some(packages);
            }
            "ModuleMainClass" => {
                descriptor.main_class = Some(pool.class_name(r.u16()?)?);
            }
            "ModuleTarget" => {
                descriptor.target = Some(pool.utf8(r.u16()?)?.to_owned());
            }
            _ => r.skip(length as u64)?,
        }
    }

    if descriptor.name.is_empty() {
        return Err(DescriptorError::Malformed(
            "descriptor has no Module attribute".into(),
        ));
    }

    let packages = match explicit_packages {
        Some(packages) => packages,
        None => descriptor
            .exposed_packages()
            .into_iter()
            .map(str::to_owned)
            .collect(),
    };
    descriptor.packages = packages;

    Ok(descriptor)
}

fn read_module_attribute(
    r: &mut Reader<'_>,
    pool: &Pool,
    descriptor: &mut Descriptor,
) -> Result<(), DescriptorError> {
    descriptor.name = pool.module_name(r.u16()?)?;

    let flags = r.u16()?;
    descriptor.modifiers = Modifiers {
        open: flags & ACC_OPEN != 0,
        automatic: false,
        synthetic: flags & ACC_SYNTHETIC != 0,
        mandated: flags & ACC_MANDATED != 0,
    };

    let version_index = r.u16()?;
    if version_index != 0 {
        descriptor.version = Some(pool.utf8(version_index)?.to_owned());
    }

    let requires_count = r.u16()?;
    for _ in 0..requires_count {
        let module = pool.module_name(r.u16()?)?;
        let flags = r.u16()?;
        let version_index = r.u16()?;
        let compiled_version = if version_index != 0 {
            Some(pool.utf8(version_index)?.to_owned())
        } else {
            None
        };
        descriptor.requires.push(Requires {
            module,
            transitive: flags & ACC_TRANSITIVE != 0,
            static_phase: flags & ACC_STATIC_PHASE != 0,
            synthetic: flags & ACC_SYNTHETIC != 0,
            mandated: flags & ACC_MANDATED != 0,
            compiled_version,
        });
    }

    let exports_count = r.u16()?;
    for _ in 0..exports_count {
        let source = pool.package_name(r.u16()?)?;
        let flags = r.u16()?;
        let to_count = r.u16()?;
        let mut targets = BTreeSet::new();
        for _ in 0..to_count {
            targets.insert(pool.module_name(r.u16()?)?);
        }
        descriptor.exports.push(Exports {
            source,
            targets,
            synthetic: flags & ACC_SYNTHETIC != 0,
            mandated: flags & ACC_MANDATED != 0,
        });
    }

    let opens_count = r.u16()?;
    for _ in 0..opens_count {
        let source = pool.package_name(r.u16()?)?;
        let flags = r.u16()?;
        let to_count = r.u16()?;
        let mut targets = BTreeSet::new();
        for _ in 0..to_count {
            targets.insert(pool.module_name(r.u16()?)?);
        }
        descriptor.opens.push(Opens {
            source,
            targets,
            synthetic: flags & ACC_SYNTHETIC != 0,
            mandated: flags & ACC_MANDATED != 0,
        });
    }

    let uses_count = r.u16()?;
    for _ in 0..uses_count {
        descriptor.uses.insert(pool.class_name(r.u16()?)?);
    }

    let provides_count = r.u16()?;
    for _ in 0..provides_count {
        let service = pool.class_name(r.u16()?)?;
        let with_count = r.u16()?;
        let mut providers = Vec::with_capacity(with_count as usize);
        for _ in 0..with_count {
            providers.push(pool.class_name(r.u16()?)?);
        }
        descriptor.provides.push(Provides { service, providers });
    }

    Ok(())
}

/// Interning constant pool writer. Indexes are handed out in first-use
/// order, so identical descriptors encode to identical bytes.
#[derive(Default)]
struct PoolBuilder {
    entries: Vec<PoolEntry>,
    utf8: IndexMap<String, u16>,
    classes: IndexMap<String, u16>,
    modules: IndexMap<String, u16>,
    packages: IndexMap<String, u16>,
}

enum PoolEntry {
    Utf8(String),
    Class(u16),
    Module(u16),
    Package(u16),
}

impl PoolBuilder {
    fn next_index(&self) -> u16 {
        self.entries.len() as u16 + 1
    }

    fn utf8(&mut self, text: &str) -> u16 {
        if let Some(&index) = self.utf8.get(text) {
            return index;
        }
        self.entries.push(PoolEntry::Utf8(text.to_owned()));
        let index = self.next_index() - 1;
        self.utf8.insert(text.to_owned(), index);
        index
    }

    fn class(&mut self, dotted: &str) -> u16 {
        if let Some(&index) = self.classes.get(dotted) {
            return index;
        }
        let name = self.utf8(&dotted.replace('.', "/"));
        self.entries.push(PoolEntry::Class(name));
        let index = self.next_index() - 1;
        self.classes.insert(dotted.to_owned(), index);
        index
    }

    fn module(&mut self, name: &str) -> u16 {
        if let Some(&index) = self.modules.get(name) {
            return index;
        }
        let utf8 = self.utf8(name);
        self.entries.push(PoolEntry::Module(utf8));
        let index = self.next_index() - 1;
        self.modules.insert(name.to_owned(), index);
        index
    }

    fn package(&mut self, dotted: &str) -> u16 {
        if let Some(&index) = self.packages.get(dotted) {
            return index;
        }
        let utf8 = self.utf8(&dotted.replace('.', "/"));
        self.entries.push(PoolEntry::Package(utf8));
        let index = self.next_index() - 1;
        self.packages.insert(dotted.to_owned(), index);
        index
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.write_u16::<BigEndian>(self.entries.len() as u16 + 1)
            .unwrap();
        for entry in &self.entries {
            match entry {
                PoolEntry::Utf8(text) => {
                    out.push(TAG_UTF8);
                    out.write_u16::<BigEndian>(text.len() as u16).unwrap();
                    out.write_all(text.as_bytes()).unwrap();
                }
                PoolEntry::Class(name) => {
                    out.push(TAG_CLASS);
                    out.write_u16::<BigEndian>(*name).unwrap();
                }
                PoolEntry::Module(name) => {
                    out.push(TAG_MODULE);
                    out.write_u16::<BigEndian>(*name).unwrap();
                }
                PoolEntry::Package(name) => {
                    out.push(TAG_PACKAGE);
                    out.write_u16::<BigEndian>(*name).unwrap();
                }
            }
        }
    }
}

fn require_name(kind: &str, name: &str) -> Result<(), DescriptorError> {
    if name.is_empty() {
        return Err(DescriptorError::Encode(format!("{kind} name is empty")));
    }
    Ok(())
}

/// Encode a descriptor as a compiled module descriptor blob.
///
/// The `automatic` modifier is dropped on the way out: strict resolvers
/// reject descriptors that carry it, so a once-automatic module encodes no
/// module flag at all.
pub fn encode(descriptor: &Descriptor) -> Result<Vec<u8>, DescriptorError> {
    require_name("module", &descriptor.name)?;
    for requires in &descriptor.requires {
        require_name("required module", &requires.module)?;
    }
    for exports in &descriptor.exports {
        require_name("exported package", &exports.source)?;
        if !descriptor.packages.contains(&exports.source) {
            return Err(DescriptorError::Encode(format!(
                "exported package `{}` is not a member of the module",
                exports.source
            )));
        }
    }
    for opens in &descriptor.opens {
        require_name("opened package", &opens.source)?;
        if !descriptor.packages.contains(&opens.source) {
            return Err(DescriptorError::Encode(format!(
                "opened package `{}` is not a member of the module",
                opens.source
            )));
        }
    }
    for uses in &descriptor.uses {
        require_name("service", uses)?;
    }
    for provides in &descriptor.provides {
        require_name("service", &provides.service)?;
        for provider in &provides.providers {
            require_name("provider", provider)?;
        }
    }

    let mut pool = PoolBuilder::default();
    let this_class = pool.class("module-info");

    let module_attr_name = pool.utf8("Module");
    let module_attr = encode_module_attribute(&mut pool, descriptor);

    let exposed = descriptor.exposed_packages();
    let packages_attr = if descriptor.packages.len() > exposed.len() {
        let name = pool.utf8("ModulePackages");
        let mut body = Vec::new();
        body.write_u16::<BigEndian>(descriptor.packages.len() as u16)
            .unwrap();
        for package in &descriptor.packages {
            let index = pool.package(package);
            body.write_u16::<BigEndian>(index).unwrap();
        }
        Some((name, body))
    } else {
        None
    };

    let main_class_attr = descriptor.main_class.as_deref().map(|main| {
        let name = pool.utf8("ModuleMainClass");
        let index = pool.class(main);
        let mut body = Vec::new();
        body.write_u16::<BigEndian>(index).unwrap();
        (name, body)
    });

    let target_attr = descriptor.target.as_deref().map(|target| {
        let name = pool.utf8("ModuleTarget");
        let index = pool.utf8(target);
        let mut body = Vec::new();
        body.write_u16::<BigEndian>(index).unwrap();
        (name, body)
    });

    let mut out = Vec::new();
    out.write_u32::<BigEndian>(MAGIC).unwrap();
    out.write_u16::<BigEndian>(MINOR_VERSION).unwrap();
    out.write_u16::<BigEndian>(MAJOR_VERSION).unwrap();
    pool.write(&mut out);
    out.write_u16::<BigEndian>(ACC_MODULE).unwrap();
    out.write_u16::<BigEndian>(this_class).unwrap();
    out.write_u16::<BigEndian>(0).unwrap(); // super_class
    out.write_u16::<BigEndian>(0).unwrap(); // interfaces
    out.write_u16::<BigEndian>(0).unwrap(); // fields
    out.write_u16::<BigEndian>(0).unwrap(); // methods

    let attributes: Vec<(u16, Vec<u8>)> = std::iter::once((module_attr_name, module_attr))
        .chain(packages_attr)
        .chain(main_class_attr)
        .chain(target_attr)
        .collect();
    out.write_u16::<BigEndian>(attributes.len() as u16).unwrap();
    for (name, body) in attributes {
        out.write_u16::<BigEndian>(name).unwrap();
        out.write_u32::<BigEndian>(body.len() as u32).unwrap();
        out.write_all(&body).unwrap();
    }

    Ok(out)
}

fn encode_module_attribute(pool: &mut PoolBuilder, descriptor: &Descriptor) -> Vec<u8> {
    let mut body = Vec::new();

    let name = pool.module(&descriptor.name);
    body.write_u16::<BigEndian>(name).unwrap();

    let mut flags = 0u16;
    if descriptor.modifiers.open {
        flags |= ACC_OPEN;
    }
    if descriptor.modifiers.synthetic {
        flags |= ACC_SYNTHETIC;
    }
    if descriptor.modifiers.mandated {
        flags |= ACC_MANDATED;
    }
    body.write_u16::<BigEndian>(flags).unwrap();

    let version = descriptor
        .version
        .as_deref()
        .map(|v| pool.utf8(v))
        .unwrap_or(0);
    body.write_u16::<BigEndian>(version).unwrap();

    body.write_u16::<BigEndian>(descriptor.requires.len() as u16)
        .unwrap();
    for requires in &descriptor.requires {
        let module = pool.module(&requires.module);
        let mut flags = 0u16;
        if requires.transitive {
            flags |= ACC_TRANSITIVE;
        }
        if requires.static_phase {
            flags |= ACC_STATIC_PHASE;
        }
        if requires.synthetic {
            flags |= ACC_SYNTHETIC;
        }
        if requires.mandated {
            flags |= ACC_MANDATED;
        }
        let version = requires
            .compiled_version
            .as_deref()
            .map(|v| pool.utf8(v))
            .unwrap_or(0);
        body.write_u16::<BigEndian>(module).unwrap();
        body.write_u16::<BigEndian>(flags).unwrap();
        body.write_u16::<BigEndian>(version).unwrap();
    }

    body.write_u16::<BigEndian>(descriptor.exports.len() as u16)
        .unwrap();
    for exports in &descriptor.exports {
        let source = pool.package(&exports.source);
        let mut flags = 0u16;
        if exports.synthetic {
            flags |= ACC_SYNTHETIC;
        }
        if exports.mandated {
            flags |= ACC_MANDATED;
        }
        body.write_u16::<BigEndian>(source).unwrap();
        body.write_u16::<BigEndian>(flags).unwrap();
        body.write_u16::<BigEndian>(exports.targets.len() as u16)
            .unwrap();
        for target in &exports.targets {
            let index = pool.module(target);
            body.write_u16::<BigEndian>(index).unwrap();
        }
    }

    body.write_u16::<BigEndian>(descriptor.opens.len() as u16)
        .unwrap();
    for opens in &descriptor.opens {
        let source = pool.package(&opens.source);
        let mut flags = 0u16;
        if opens.synthetic {
            flags |= ACC_SYNTHETIC;
        }
        if opens.mandated {
            flags |= ACC_MANDATED;
        }
        body.write_u16::<BigEndian>(source).unwrap();
        body.write_u16::<BigEndian>(flags).unwrap();
        body.write_u16::<BigEndian>(opens.targets.len() as u16)
            .unwrap();
        for target in &opens.targets {
            let index = pool.module(target);
            body.write_u16::<BigEndian>(index).unwrap();
        }
    }

    body.write_u16::<BigEndian>(descriptor.uses.len() as u16)
        .unwrap();
    for uses in &descriptor.uses {
        let index = pool.class(uses);
        body.write_u16::<BigEndian>(index).unwrap();
    }

    body.write_u16::<BigEndian>(descriptor.provides.len() as u16)
        .unwrap();
    for provides in &descriptor.provides {
        let service = pool.class(&provides.service);
        body.write_u16::<BigEndian>(service).unwrap();
        body.write_u16::<BigEndian>(provides.providers.len() as u16)
            .unwrap();
        for provider in &provides.providers {
            let index = pool.class(provider);
            body.write_u16::<BigEndian>(index).unwrap();
        }
    }

    body
}
