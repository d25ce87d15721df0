//! Fixture builders shared by the unit tests.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use modlink_types::{Descriptor, Exports, Requires};

/// Write a jar with the given entries, in order, with fixed timestamps.
pub(crate) fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

/// A minimal class file declaring `internal_name` (slash form) as its own
/// name: magic, versions, a two-entry constant pool, and empty bodies.
pub(crate) fn class_bytes(internal_name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<BigEndian>(0xCAFE_BABE).unwrap();
    out.write_u16::<BigEndian>(0).unwrap(); // minor
    out.write_u16::<BigEndian>(53).unwrap(); // major
    out.write_u16::<BigEndian>(3).unwrap(); // constant pool count
    out.push(1); // CONSTANT_Utf8
    out.write_u16::<BigEndian>(internal_name.len() as u16).unwrap();
    out.extend_from_slice(internal_name.as_bytes());
    out.push(7); // CONSTANT_Class
    out.write_u16::<BigEndian>(1).unwrap();
    out.write_u16::<BigEndian>(0x0021).unwrap(); // ACC_PUBLIC | ACC_SUPER
    out.write_u16::<BigEndian>(2).unwrap(); // this_class
    out.write_u16::<BigEndian>(0).unwrap(); // super_class
    out.write_u16::<BigEndian>(0).unwrap(); // interfaces
    out.write_u16::<BigEndian>(0).unwrap(); // fields
    out.write_u16::<BigEndian>(0).unwrap(); // methods
    out.write_u16::<BigEndian>(0).unwrap(); // attributes
    out
}

/// A jar without a descriptor or manifest; its module name derives from the
/// file name and its packages from the class entries.
pub(crate) fn automatic_jar(path: &Path, class_entries: &[&str]) {
    let classes: Vec<Vec<u8>> = class_entries
        .iter()
        .map(|entry| class_bytes(entry.trim_end_matches(".class")))
        .collect();
    let entries: Vec<(&str, &[u8])> = class_entries
        .iter()
        .zip(&classes)
        .map(|(name, bytes)| (*name, bytes.as_slice()))
        .collect();
    write_jar(path, &entries);
}

/// A jar declaring a strict module that exports every listed package.
pub(crate) fn jar_with_descriptor(path: &Path, module: &str, packages: &[&str]) {
    let descriptor = strict_descriptor(module, packages, &[]);
    let blob = crate::descriptor::encode(&descriptor).unwrap();
    write_jar(path, &[("module-info.class", blob.as_slice())]);
}

fn strict_descriptor(module: &str, packages: &[&str], requires: &[&str]) -> Descriptor {
    let mut descriptor = Descriptor::named(module);
    for package in packages {
        descriptor.packages.insert((*package).to_owned());
        descriptor.exports.push(Exports::unqualified(*package));
    }
    for target in requires {
        descriptor.requires.push(Requires::plain(*target));
    }
    descriptor
}
