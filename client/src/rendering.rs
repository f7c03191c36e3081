use crate::game::{OrderView, RenderEntity};
use macroquad::prelude::*;
use shared::prefab::EntityKind;
use shared::{WORLD_HEIGHT, WORLD_WIDTH};

/// Fill colour and outline per entity kind, looked up once per entity.
pub struct Visual {
    pub fill: Color,
    pub outline: Option<Color>,
}

pub fn visual_for(kind: Option<EntityKind>, is_local_player: bool) -> Visual {
    match kind {
        Some(EntityKind::Player) if is_local_player => Visual {
            fill: GREEN,
            outline: Some(WHITE),
        },
        Some(EntityKind::Player) => Visual {
            fill: Color::from_rgba(255, 68, 68, 255),
            outline: Some(WHITE),
        },
        Some(EntityKind::Counter) => Visual {
            fill: Color::from_rgba(139, 110, 78, 255),
            outline: Some(Color::from_rgba(90, 70, 50, 255)),
        },
        Some(EntityKind::Stove) => Visual {
            fill: Color::from_rgba(70, 70, 80, 255),
            outline: Some(ORANGE),
        },
        Some(EntityKind::TrashBin) => Visual {
            fill: Color::from_rgba(40, 40, 40, 255),
            outline: Some(GRAY),
        },
        Some(EntityKind::PattyBox) => Visual {
            fill: Color::from_rgba(200, 160, 120, 255),
            outline: Some(BROWN),
        },
        Some(EntityKind::OrderWindow) => Visual {
            fill: Color::from_rgba(60, 120, 200, 255),
            outline: Some(SKYBLUE),
        },
        Some(EntityKind::UncookedPatty) => Visual {
            fill: PINK,
            outline: None,
        },
        Some(EntityKind::CookedPatty) => Visual {
            fill: Color::from_rgba(110, 60, 30, 255),
            outline: None,
        },
        None => Visual {
            fill: MAGENTA,
            outline: None,
        },
    }
}

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub connected: bool,
    pub prediction_enabled: bool,
    pub interpolation_enabled: bool,
    pub pending_inputs: usize,
    pub correction_px: f32,
    pub status: Option<String>,
}

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Renderer {
            width: width as f32,
            height: height as f32,
        })
    }

    /// Scale from world units to the window, preserving aspect ratio.
    fn scale(&self) -> f32 {
        (self.width / WORLD_WIDTH).min(self.height / WORLD_HEIGHT)
    }

    pub fn render(&mut self, entities: &[RenderEntity], orders: &[OrderView], ui: UiConfig) {
        clear_background(Color::from_rgba(26, 26, 26, 255));
        let scale = self.scale();
        draw_rectangle(
            0.0,
            0.0,
            WORLD_WIDTH * scale,
            WORLD_HEIGHT * scale,
            Color::from_rgba(48, 48, 48, 255),
        );

        for entity in entities {
            self.draw_entity(entity, scale);
        }
        self.draw_orders(orders);
        self.draw_ui(&ui);
    }

    fn draw_entity(&mut self, entity: &RenderEntity, scale: f32) {
        let visual = visual_for(entity.kind, entity.is_local_player);
        let x = (entity.position.x - entity.size.x / 2.0) * scale;
        let y = (entity.position.y - entity.size.y / 2.0) * scale;
        let w = entity.size.x * scale;
        let h = entity.size.y * scale;

        draw_rectangle(x, y, w, h, visual.fill);
        if let Some(outline) = visual.outline {
            draw_rectangle_lines(x, y, w, h, 2.0, outline);
        }

        if let Some(progress) = entity.cooking {
            draw_rectangle(x, y - 5.0, w, 3.0, DARKGRAY);
            draw_rectangle(x, y - 5.0, w * progress, 3.0, ORANGE);
        }
    }

    fn draw_orders(&mut self, orders: &[OrderView]) {
        let x = self.width - 170.0;
        for (i, order) in orders.iter().enumerate() {
            let y = 20.0 + i as f32 * 18.0;
            let text = format!(
                "Order {}/{}  {:>4.0}s",
                order.fulfilled, order.required, order.remaining_secs
            );
            let color = if order.remaining_secs < 10.0 { RED } else { WHITE };
            draw_text(&text, x, y, 16.0, color);
        }
    }

    fn draw_ui(&mut self, ui: &UiConfig) {
        let y_start = self.height - 40.0;
        let indicator_size = 12.0;
        let spacing = 25.0;

        let features = [("P", ui.prediction_enabled), ("I", ui.interpolation_enabled)];
        for (i, (label, enabled)) in features.iter().enumerate() {
            let x = 10.0 + (i as f32) * spacing;
            let color = if *enabled { GREEN } else { RED };
            draw_rectangle(x, y_start, indicator_size, indicator_size, color);
            draw_rectangle_lines(x, y_start, indicator_size, indicator_size, 1.0, WHITE);
            draw_text(label, x + 3.0, y_start + indicator_size + 12.0, 12.0, WHITE);
        }

        let connection_color = if ui.connected { GREEN } else { RED };
        draw_rectangle(70.0, y_start + 2.0, 8.0, 8.0, connection_color);
        draw_text("CON", 80.0, y_start + 10.0, 12.0, WHITE);

        let stats = format!(
            "pending {}  correction {:.1}px",
            ui.pending_inputs, ui.correction_px
        );
        draw_text(&stats, 120.0, y_start + 10.0, 14.0, LIGHTGRAY);

        if let Some(status) = &ui.status {
            draw_text(status, 10.0, y_start - 10.0, 18.0, YELLOW);
        }
    }
}
