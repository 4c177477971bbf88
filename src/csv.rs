use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use color_eyre::eyre::{eyre, Result, WrapErr};
use nalgebra::{Vector2, Vector3};

/// Write the x and y coordinates as two comma separated columns, one row per
/// particle.
pub fn write_positions(positions: &[Vector3<f64>], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut file = BufWriter::new(
        File::create(path).wrap_err_with(|| format!("failed to create {}", path.display()))?,
    );

    for (i, pos) in positions.iter().enumerate() {
        writeln!(file, "{},{}", pos.x, pos.y)
            .wrap_err_with(|| format!("{}:{}: failed to write row", path.display(), i + 1))?;
    }
    file.flush()
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;

    Ok(())
}

/// Read a file written by [`write_positions`].
pub fn read_positions(path: impl AsRef<Path>) -> Result<Vec<Vector2<f64>>> {
    let path = path.as_ref();
    let file =
        File::open(path).wrap_err_with(|| format!("failed to open {}", path.display()))?;

    let mut positions = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let mut columns = line.split(',').map(|col| col.trim().parse::<f64>());
        match (columns.next(), columns.next(), columns.next()) {
            (Some(x), Some(y), None) => positions.push(Vector2::new(
                x.wrap_err_with(|| format!("{}:{}: bad x", path.display(), i + 1))?,
                y.wrap_err_with(|| format!("{}:{}: bad y", path.display(), i + 1))?,
            )),
            _ => {
                return Err(eyre!(
                    "{}:{}: expected two columns, got {line:?}",
                    path.display(),
                    i + 1
                ))
            }
        }
    }

    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("galaxy_sim_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_positions_roundtrip() {
        let positions = vec![
            Vector3::new(1.5, -2.25, 9.),
            Vector3::new(1. / 3., std::f64::consts::PI * 1e5, 0.),
            Vector3::new(-1e-12, 299.99999999, -4.),
        ];
        let path = temp_file("roundtrip.csv");

        write_positions(&positions, &path).unwrap();
        let read = read_positions(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(read.len(), positions.len());
        for (r, p) in read.iter().zip(&positions) {
            assert_eq!(r.x, p.x);
            assert_eq!(r.y, p.y);
        }
    }

    #[test]
    fn test_layout() {
        let path = temp_file("layout.csv");
        write_positions(&[Vector3::new(1., 2., 3.), Vector3::new(-4., 0.5, 0.)], &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(text, "1,2\n-4,0.5\n");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_error_names_file_and_row() {
        // enough rows to overflow the writer's buffer before the final flush
        let positions = vec![Vector3::new(123.456, -789.012, 0.); 10_000];
        let err = write_positions(&positions, "/dev/full").unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("/dev/full:"), "{message}");
        assert!(message.contains("failed to write row"), "{message}");
    }

    #[test]
    fn test_rejects_malformed_rows() {
        let path = temp_file("malformed.csv");
        std::fs::write(&path, "1,2\n3\n").unwrap();
        let err = read_positions(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(err.to_string().contains(":2:"));
    }
}
